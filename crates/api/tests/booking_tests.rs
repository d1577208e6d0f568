mod common;

use common::*;

#[tokio::test]
async fn test_place_booking_debits_seat_price() {
    let app = setup_test_app().await;
    let slot_id = propose_class(&app, 10).await;
    let (user_id, claims) = create_test_player(&app, 5_000, 0).await;

    let response = book(&app, slot_id, 1, "CREDITS", claims).await;
    assert!(response.errors.is_empty(), "Booking should succeed: {:?}", response.errors);

    let data = response.data.into_json().unwrap();
    let receipt = &data["placeBooking"];
    assert_eq!(receipt["booking"]["status"], "PENDING");
    assert_eq!(receipt["booking"]["amountPaid"], 500);
    assert_eq!(receipt["confirmation"], "UNCHANGED");
    assert_eq!(receipt["slot"]["state"], "PROPOSED");

    assert_eq!(wallet_of(&app, user_id).await, (4_500, 0));
}

#[tokio::test]
async fn test_filling_last_seat_confirms_on_a_court() {
    let app = setup_test_app().await;
    let slot_id = propose_class(&app, 10).await;

    for _ in 0..3 {
        let (_, claims) = create_test_player(&app, 5_000, 0).await;
        let response = book(&app, slot_id, 1, "CREDITS", claims).await;
        assert!(response.errors.is_empty(), "{:?}", response.errors);
    }

    let (_, claims) = create_test_player(&app, 5_000, 0).await;
    let response = book(&app, slot_id, 1, "CREDITS", claims).await;
    assert!(response.errors.is_empty(), "{:?}", response.errors);

    let data = response.data.into_json().unwrap();
    let receipt = &data["placeBooking"];
    assert_eq!(receipt["confirmation"], "CONFIRMED");
    assert_eq!(receipt["booking"]["status"], "CONFIRMED");
    assert!(receipt["courtId"].is_string());
    assert_eq!(receipt["slot"]["courtId"], receipt["courtId"]);

    let bookings = app.state.engine().slot_bookings(slot_id).await.unwrap();
    assert!(bookings
        .iter()
        .all(|b| b.status == infra::models::BookingStatus::Confirmed));
}

#[tokio::test]
async fn test_overbooking_is_a_conflict() {
    let app = setup_test_app().await;
    let slot_id = propose_class(&app, 10).await;

    let (_, first) = create_test_player(&app, 5_000, 0).await;
    assert!(book(&app, slot_id, 3, "CREDITS", first).await.errors.is_empty());

    let (_, second) = create_test_player(&app, 5_000, 0).await;
    let response = book(&app, slot_id, 2, "CREDITS", second).await;
    assert_eq!(error_code(&response), "CONFLICT");
    assert!(response.errors[0].message.contains("capacity exceeded by 1"));
}

#[tokio::test]
async fn test_insufficient_credit_leaves_wallet_untouched() {
    let app = setup_test_app().await;
    let slot_id = propose_class(&app, 10).await;
    let (user_id, claims) = create_test_player(&app, 100, 0).await;

    let response = book(&app, slot_id, 1, "CREDITS", claims).await;
    assert_eq!(error_code(&response), "CONFLICT");
    assert_eq!(wallet_of(&app, user_id).await, (100, 0));
    assert!(app.state.engine().slot_bookings(slot_id).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_points_payment_uses_redemption_rate() {
    let app = setup_test_app().await;
    let slot_id = propose_class(&app, 10).await;
    // 5.00 a seat at 10 points per euro.
    let (user_id, claims) = create_test_player(&app, 0, 80).await;

    let response = book(&app, slot_id, 1, "POINTS", claims).await;
    assert!(response.errors.is_empty(), "{:?}", response.errors);
    let data = response.data.into_json().unwrap();
    assert_eq!(data["placeBooking"]["booking"]["pointsPaid"], 50);
    assert_eq!(wallet_of(&app, user_id).await, (0, 30));
}

#[tokio::test]
async fn test_invalid_group_size_is_rejected() {
    let app = setup_test_app().await;
    let slot_id = propose_class(&app, 10).await;
    let (_, claims) = create_test_player(&app, 50_000, 0).await;

    let response = book(&app, slot_id, 5, "CREDITS", claims).await;
    assert_eq!(error_code(&response), "VALIDATION");
}

#[tokio::test]
async fn test_booking_requires_authentication() {
    let app = setup_test_app().await;
    let slot_id = propose_class(&app, 10).await;

    let query = r#"
        mutation Book($slotId: UUID!) {
            placeBooking(slotId: $slotId) { booking { id } }
        }
    "#;
    let variables = async_graphql::Variables::from_json(serde_json::json!({ "slotId": slot_id }));
    let response = execute_graphql(&app.schema, query, Some(variables), None).await;
    assert_eq!(error_code(&response), "UNAUTHENTICATED");
}

#[tokio::test]
async fn test_privatize_buys_remaining_seats() {
    let app = setup_test_app().await;
    let slot_id = propose_class(&app, 10).await;
    let (_, first) = create_test_player(&app, 5_000, 0).await;
    assert!(book(&app, slot_id, 1, "CREDITS", first).await.errors.is_empty());

    let (organizer_id, claims) = create_test_player(&app, 5_000, 0).await;
    let query = r#"
        mutation Privatize($slotId: UUID!) {
            privatize(slotId: $slotId) {
                booking { groupSize amountPaid }
                confirmation
            }
        }
    "#;
    let variables = async_graphql::Variables::from_json(serde_json::json!({ "slotId": slot_id }));
    let response = execute_graphql(&app.schema, query, Some(variables), Some(claims)).await;
    assert!(response.errors.is_empty(), "{:?}", response.errors);

    let data = response.data.into_json().unwrap();
    assert_eq!(data["privatize"]["booking"]["groupSize"], 3);
    assert_eq!(data["privatize"]["booking"]["amountPaid"], 1_500);
    assert_eq!(data["privatize"]["confirmation"], "CONFIRMED");
    assert_eq!(wallet_of(&app, organizer_id).await, (3_500, 0));
}

#[tokio::test]
async fn test_instructor_is_never_confirmed_into_overlapping_classes() {
    let app = setup_test_app().await;
    let proposals = app
        .state
        .engine()
        .create_proposals(app.club.id, test_day(), &[app.instructor.id])
        .await
        .unwrap();
    let starting = |h, m| {
        proposals
            .iter()
            .find(|s| s.start_at == at(h, m))
            .map(|s| s.id)
            .unwrap()
    };

    let (_, claims) = create_test_player(&app, 50_000, 0).await;
    let response = book(&app, starting(10, 0), 4, "CREDITS", claims).await;
    assert!(response.errors.is_empty(), "{:?}", response.errors);

    for slot_id in [starting(10, 30), starting(9, 30)] {
        let (user_id, claims) = create_test_player(&app, 50_000, 0).await;
        let response = book(&app, slot_id, 4, "CREDITS", claims).await;
        assert_eq!(error_code(&response), "CONFLICT");
        assert!(response.errors[0].message.contains("changeover buffer"));
        assert_eq!(wallet_of(&app, user_id).await, (50_000, 0));
    }
}
