mod common;

use async_graphql::Variables;
use common::*;
use infra::models::SlotState;
use infra::store::BookingStore;
use serde_json::json;

const CREATE_PROPOSALS: &str = r#"
    mutation Create($clubId: UUID!, $day: NaiveDate!, $instructorIds: [UUID!]!) {
        createProposals(clubId: $clubId, day: $day, instructorIds: $instructorIds) {
            id
            kind
            startAt
            durationMinutes
            state
        }
    }
"#;

#[tokio::test]
async fn test_create_proposals_fills_the_day_once() {
    let app = setup_test_app().await;
    let variables = || {
        Variables::from_json(json!({
            "clubId": app.club.id,
            "day": test_day().to_string(),
            "instructorIds": [app.instructor.id],
        }))
    };

    let response =
        execute_graphql(&app.schema, CREATE_PROPOSALS, Some(variables()), Some(manager_claims())).await;
    assert!(response.errors.is_empty(), "{:?}", response.errors);
    let data = response.data.into_json().unwrap();
    let slots = data["createProposals"].as_array().unwrap();
    // 08:00 through 21:00 every half hour.
    assert_eq!(slots.len(), 27);
    assert!(slots.iter().all(|s| s["kind"] == "CLASS" && s["durationMinutes"] == 60));

    let again =
        execute_graphql(&app.schema, CREATE_PROPOSALS, Some(variables()), Some(manager_claims())).await;
    assert!(again.errors.is_empty(), "{:?}", again.errors);
    let data = again.data.into_json().unwrap();
    assert!(data["createProposals"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_create_proposals_requires_manager() {
    let app = setup_test_app().await;
    let (_, claims) = create_test_player(&app, 0, 0).await;
    let variables = Variables::from_json(json!({
        "clubId": app.club.id,
        "day": test_day().to_string(),
        "instructorIds": [app.instructor.id],
    }));

    let response = execute_graphql(&app.schema, CREATE_PROPOSALS, Some(variables), Some(claims)).await;
    assert_eq!(error_code(&response), "FORBIDDEN");
}

#[tokio::test]
async fn test_player_organizes_a_match() {
    let app = setup_test_app().await;
    let (user_id, claims) = create_test_player(&app, 0, 0).await;

    let query = r#"
        mutation Propose($input: ProposeSlotInput!) {
            proposeSlot(input: $input) {
                kind
                organizerId
                recurring
                endAt
                totalPrice
                seatPrice
            }
        }
    "#;
    let variables = Variables::from_json(json!({
        "input": {
            "clubId": app.club.id,
            "kind": "MATCH",
            "recurring": true,
            "startAt": at(18, 0).to_rfc3339(),
            "durationMinutes": 90,
        }
    }));
    let response = execute_graphql(&app.schema, query, Some(variables), Some(claims)).await;
    assert!(response.errors.is_empty(), "{:?}", response.errors);

    let data = response.data.into_json().unwrap();
    let slot = &data["proposeSlot"];
    assert_eq!(slot["kind"], "MATCH");
    assert_eq!(slot["organizerId"], user_id.to_string());
    assert_eq!(slot["recurring"], true);
    assert_eq!(slot["totalPrice"], 3_000);
    assert_eq!(slot["seatPrice"], 750);
}

#[tokio::test]
async fn test_player_cannot_propose_a_class() {
    let app = setup_test_app().await;
    let (_, claims) = create_test_player(&app, 0, 0).await;

    let query = r#"
        mutation Propose($input: ProposeSlotInput!) {
            proposeSlot(input: $input) { id }
        }
    "#;
    let variables = Variables::from_json(json!({
        "input": {
            "clubId": app.club.id,
            "kind": "CLASS",
            "instructorId": app.instructor.id,
            "startAt": at(10, 0).to_rfc3339(),
        }
    }));
    let response = execute_graphql(&app.schema, query, Some(variables), Some(claims)).await;
    assert_eq!(error_code(&response), "FORBIDDEN");
}

#[tokio::test]
async fn test_misaligned_start_is_a_validation_error() {
    let app = setup_test_app().await;
    let (_, claims) = create_test_player(&app, 0, 0).await;

    let query = r#"
        mutation Propose($input: ProposeSlotInput!) {
            proposeSlot(input: $input) { id }
        }
    "#;
    let variables = Variables::from_json(json!({
        "input": {
            "clubId": app.club.id,
            "kind": "RENTAL",
            "startAt": at(10, 15).to_rfc3339(),
        }
    }));
    let response = execute_graphql(&app.schema, query, Some(variables), Some(claims)).await;
    assert_eq!(error_code(&response), "VALIDATION");
}

#[tokio::test]
async fn test_can_start_at_respects_instructor_buffer() {
    let app = setup_test_app().await;
    let slot_id = propose_class(&app, 10).await;
    // Confirmed class at 10:00 for the same instructor.
    let mut slot = slot_of(&app, slot_id).await;
    slot.id = uuid::Uuid::new_v4();
    slot.state = SlotState::Confirmed;
    app.store.insert_slot(slot).await.unwrap();

    let query = r#"
        query Check($input: CanStartAtInput!) {
            canStartAt(input: $input)
        }
    "#;
    let check = |time: &str| {
        Variables::from_json(json!({
            "input": {
                "clubId": app.club.id,
                "instructorId": app.instructor.id,
                "day": test_day().to_string(),
                "time": time,
            }
        }))
    };

    let busy = execute_graphql(&app.schema, query, Some(check("09:30:00")), None).await;
    assert!(busy.errors.is_empty(), "{:?}", busy.errors);
    assert_eq!(busy.data.into_json().unwrap()["canStartAt"], false);

    let free = execute_graphql(&app.schema, query, Some(check("11:00:00")), None).await;
    assert_eq!(free.data.into_json().unwrap()["canStartAt"], true);
}

#[tokio::test]
async fn test_resolve_price_falls_back_to_club_rate() {
    let app = setup_test_app().await;
    let query = r#"
        query Price($clubId: UUID!, $at: DateTime!) {
            resolvePrice(clubId: $clubId, at: $at)
        }
    "#;
    let variables = Variables::from_json(json!({
        "clubId": app.club.id,
        "at": at(19, 0).to_rfc3339(),
    }));
    let response = execute_graphql(&app.schema, query, Some(variables), None).await;
    assert!(response.errors.is_empty(), "{:?}", response.errors);
    assert_eq!(response.data.into_json().unwrap()["resolvePrice"], 2_000);
}
