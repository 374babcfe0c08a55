//! Shared fixtures for unit tests

use std::sync::Arc;

use genie_templates::PhraseLibrary;
use genie_thingtalk::{
    ArgumentDef, ConfirmMode, ConfirmationState, DialogueHistoryItem, DialogueState, Expression,
    ExpressionStatement, FunctionDef, Invocation, ResultItem, ResultList, Type, Value,
};

use crate::context_info::POLICY_NAME;
use crate::library::{FollowUp, Thingpedia};
use crate::simulator::FixtureDb;

pub const RESTAURANT: &str = "com.yelp:restaurant";

pub fn restaurant_schema() -> Arc<FunctionDef> {
    FunctionDef::query("com.yelp", "restaurant")
        .with_list(true)
        .with_monitorable(true)
        .with_related("com.yelp.restaurant_reviews")
        .with_arg(ArgumentDef::output("id", Type::entity(RESTAURANT)).with_unique(true))
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
        .with_arg(ArgumentDef::required("restaurant", Type::entity(RESTAURANT)))
        .with_arg(ArgumentDef::required("book_time", Type::Time))
        .with_arg(ArgumentDef::required("book_people", Type::Number))
        .with_arg(ArgumentDef::output("reservation_id", Type::String))
        .build()
}

pub fn hotel_schema() -> Arc<FunctionDef> {
    FunctionDef::query("com.hotels", "hotel")
        .with_list(true)
        .with_arg(ArgumentDef::output("id", Type::entity("com.hotels:hotel")).with_unique(true))
        .with_arg(ArgumentDef::output("stars", Type::Number))
        .build()
}

pub fn restaurants() -> Expression {
    Invocation::new(restaurant_schema()).into()
}

/// A reservation with every required parameter still undefined.
pub fn reservation_invocation() -> Invocation {
    let mut invocation = Invocation::new(reservation_schema());
    invocation.add_missing_required_params();
    invocation
}

pub fn complete_reservation(restaurant: &str) -> Invocation {
    Invocation::new(reservation_schema())
        .with_param("restaurant", restaurant_entity(restaurant))
        .with_param("book_time", Value::Time { hour: 19, minute: 0 })
        .with_param("book_people", Value::Number(2.0))
}

pub fn statement(expression: impl Into<Expression>) -> ExpressionStatement {
    ExpressionStatement::single(expression.into())
}

pub fn restaurant_entity(id: &str) -> Value {
    let display = format!("Restaurant {}", id);
    Value::entity(id, RESTAURANT, Some(&display))
}

pub fn restaurant_result(id: &str, price: &str, rating: f64) -> ResultItem {
    ResultItem::from_pairs([
        ("id", restaurant_entity(id)),
        ("price", Value::enumerated(price)),
        ("rating", Value::Number(rating)),
        ("area", Value::enumerated("centre")),
    ])
}

pub fn make_state(act: &str, history: Vec<DialogueHistoryItem>) -> DialogueState {
    DialogueState::new(POLICY_NAME, act, None).with_history(history)
}

/// The user searched for restaurants and got `results`.
pub fn search_state(results: Vec<ResultItem>) -> DialogueState {
    search_state_for(restaurants(), results)
}

pub fn search_state_for(table: Expression, results: Vec<ResultItem>) -> DialogueState {
    make_state(
        "execute",
        vec![DialogueHistoryItem::new(statement(table), ConfirmationState::Confirmed)
            .with_results(ResultList::new(results))],
    )
}

pub fn phrases() -> PhraseLibrary {
    PhraseLibrary::from_yaml(PHRASES).unwrap()
}

pub fn library() -> Thingpedia {
    let mut library = Thingpedia::new();
    library
        .add_function(restaurant_schema())
        .add_function(reservation_schema())
        .add_function(hotel_schema());
    library
        .add_follow_up(
            "com.yelp.restaurant",
            FollowUp {
                function: "com.yelp.make_reservation".to_string(),
                params: Vec::new(),
                condition: None,
            },
        )
        .unwrap();
    library.add_id_query(RESTAURANT, "com.yelp.restaurant").unwrap();
    library.set_initial_function("com.yelp.restaurant").unwrap();
    library.with_phrases(phrases())
}

const PHRASES: &str = r#"
functions:
  com.yelp.restaurant:
    description: ["restaurants"]
    result:
      top: ["${id} is a ${price} restaurant rated ${rating} stars"]
      list: ["i found ${id} and others"]
      list_concat: ["${id}"]
    empty: ["i could not find any restaurant"]
    name_param: id
  com.yelp.make_reservation:
    description: ["a reservation at ${restaurant} for ${book_people} people at ${book_time}"]
    result:
      top: ["your reservation is confirmed, the code is ${reservation_id}"]
    error:
      no_table: ["there are no tables left at ${restaurant}"]
utterances:
  ctx_sys_greet: ["{hello|hi}, how can i help you?"]
  ctx_sys_end: ["alright, let me know if I can help you with anything else!"]
notifications:
  yelp: ["Yelp"]
"#;

pub fn fixture_db() -> FixtureDb {
    FixtureDb::from_yaml(FIXTURE_DB).unwrap()
}

const FIXTURE_DB: &str = r#"
tables:
  com.yelp.restaurant:
    - id: { entity: { value: r1, type: "com.yelp:restaurant", display: "Il Fornaio" } }
      price: { enum: expensive }
      rating: { number: 4.5 }
    - id: { entity: { value: r2, type: "com.yelp:restaurant", display: "Taco Bell" } }
      price: { enum: cheap }
      rating: { number: 3.0 }
    - id: { entity: { value: r3, type: "com.yelp:restaurant", display: "Oren's Hummus" } }
      price: { enum: cheap }
      rating: { number: 4.0 }
  com.yelp.make_reservation:
    - reservation_id: { string: ABC123 }
"#;
