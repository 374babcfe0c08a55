use std::sync::Arc;

use crate::schema::{ArgumentDef, ConfirmMode, FunctionDef};
use crate::types::Type;

pub fn restaurant_schema() -> Arc<FunctionDef> {
    FunctionDef::query("com.yelp", "restaurant")
        .with_list(true)
        .with_monitorable(true)
        .with_arg(ArgumentDef::output("id", Type::entity("com.yelp:restaurant")).with_unique(true))
        .with_arg(ArgumentDef::output(
            "price",
            Type::enumeration(["cheap", "moderate", "expensive"]),
        ))
        .with_arg(ArgumentDef::output("rating", Type::Number))
        .with_arg(ArgumentDef::output(
            "cuisine",
            Type::array(Type::entity("com.yelp:restaurant_cuisine")),
        ))
        .with_arg(ArgumentDef::output("area", Type::enumeration(["north", "south", "centre"])))
        .with_arg(ArgumentDef::optional("near", Type::Location))
        .build()
}

pub fn reservation_schema() -> Arc<FunctionDef> {
    FunctionDef::action("com.yelp", "make_reservation")
        .with_confirm(ConfirmMode::Confirm)
        .with_arg(ArgumentDef::required("restaurant", Type::entity("com.yelp:restaurant")))
        .with_arg(ArgumentDef::required("book_time", Type::Time))
        .with_arg(ArgumentDef::required("book_people", Type::Number))
        .with_arg(ArgumentDef::output("reservation_id", Type::String))
        .build()
}
