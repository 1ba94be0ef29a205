use common::error::{snippet, BODY_SNIPPET_CHARS};
use common::OrderStatus;
use proptest::prelude::*;

fn any_status() -> impl Strategy<Value = OrderStatus> {
    prop_oneof![
        Just(OrderStatus::New),
        Just(OrderStatus::PartiallyFilled),
        Just(OrderStatus::Filled),
        Just(OrderStatus::Cancelled),
        Just(OrderStatus::Rejected),
    ]
}

proptest! {
    /// Once an order has closed, no update may reopen or alter it.
    #[test]
    fn terminal_states_never_transition(from in any_status(), to in any_status()) {
        if from.is_terminal() {
            prop_assert!(!from.can_transition_to(to));
        }
    }

    /// Nothing ever moves back to NEW.
    #[test]
    fn no_transition_back_to_new(from in any_status()) {
        prop_assert!(!from.can_transition_to(OrderStatus::New));
    }

    /// Status names survive the wire in both directions.
    #[test]
    fn status_wire_name_is_stable(status in any_status()) {
        let json = serde_json::to_string(&status).unwrap();
        prop_assert_eq!(json.trim_matches('"'), status.to_string());
        prop_assert_eq!(OrderStatus::from_exchange(&status.to_string()), Some(status));
    }

    /// Body snippets never panic on arbitrary unicode and stay bounded.
    #[test]
    fn snippet_is_bounded(body in "\\PC{0,600}") {
        let cut = snippet(&body);
        prop_assert!(cut.chars().count() <= BODY_SNIPPET_CHARS + 1);
    }
}
