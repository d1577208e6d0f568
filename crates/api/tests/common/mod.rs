use std::sync::Arc;

use api::auth::{AuthConfig, Claims};
use api::gql::types::Role;
use api::gql::{build_schema, AppSchema};
use api::AppState;
use async_graphql::{Request, Variables};
use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use infra::clock::ManualClock;
use infra::models::{Club, ClubSettings, CourtRow, InstructorRow, Slot, WalletRow};
use infra::store::{BookingStore, MemoryStore};
use uuid::Uuid;

/// A club seeded in memory: open 08:00-22:00 UTC, two courts, one instructor.
/// The clock reads Monday 2026-03-02 06:00 UTC until a test moves it.
pub struct TestApp {
    pub state: AppState,
    pub schema: AppSchema,
    pub store: MemoryStore,
    pub clock: ManualClock,
    pub club: Club,
    pub instructor: InstructorRow,
}

pub async fn setup_test_app() -> TestApp {
    let now = at(6, 0);
    let store = MemoryStore::new();
    let clock = ManualClock::new(now);

    let club = Club {
        id: Uuid::new_v4(),
        name: "Test Padel Club".into(),
        settings: ClubSettings::default(),
        created_at: now,
        updated_at: now,
    };
    store.insert_club(club.clone()).await;

    for number in 1..=2 {
        store
            .insert_court(CourtRow {
                id: Uuid::new_v4(),
                club_id: club.id,
                number,
                is_active: true,
                capacity: 4,
                created_at: now,
                updated_at: now,
            })
            .await;
    }

    let instructor = InstructorRow {
        id: Uuid::new_v4(),
        user_id: Uuid::new_v4(),
        club_id: club.id,
        hourly_rate_cents: 3000,
        is_active: true,
        created_at: now,
        updated_at: now,
    };
    store.insert_instructor(instructor.clone()).await;

    let state = AppState::new(
        Arc::new(store.clone()),
        Arc::new(clock.clone()),
        &AuthConfig::new("test-secret", 1),
    );
    let schema = build_schema(state.clone());

    TestApp {
        state,
        schema,
        store,
        clock,
        club,
        instructor,
    }
}

pub fn test_day() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 3, 2).unwrap()
}

pub fn at(h: u32, m: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 2, h, m, 0).unwrap()
}

/// Helper function to execute GraphQL queries and mutations
pub async fn execute_graphql(
    schema: &AppSchema,
    query: &str,
    variables: Option<Variables>,
    auth_claims: Option<Claims>,
) -> async_graphql::Response {
    let mut request = Request::new(query);

    if let Some(vars) = variables {
        request = request.variables(vars);
    }

    if let Some(claims) = auth_claims {
        request = request.data(claims);
    }

    schema.execute(request).await
}

/// Player with a funded wallet; returns their id and JWT claims.
#[allow(dead_code)]
pub async fn create_test_player(app: &TestApp, credit_cents: i64, points: i64) -> (Uuid, Claims) {
    let user_id = Uuid::new_v4();
    app.store
        .upsert_wallet(WalletRow {
            user_id,
            credit_cents,
            points,
            updated_at: at(6, 0),
        })
        .await;
    let claims = Claims::new(user_id, format!("player_{user_id}@example.com"), Role::Player, 1);
    (user_id, claims)
}

#[allow(dead_code)]
pub fn manager_claims() -> Claims {
    let user_id = Uuid::new_v4();
    Claims::new(user_id, format!("manager_{user_id}@example.com"), Role::Manager, 1)
}

#[allow(dead_code)]
pub async fn wallet_of(app: &TestApp, user_id: Uuid) -> (i64, i64) {
    let wallet = app.store.wallet(user_id).await.unwrap().unwrap();
    (wallet.credit_cents, wallet.points)
}

#[allow(dead_code)]
pub async fn slot_of(app: &TestApp, slot_id: Uuid) -> Slot {
    app.store.slot(slot_id).await.unwrap().unwrap()
}

#[allow(dead_code)]
pub fn advance(app: &TestApp, by: Duration) {
    app.clock.advance(by);
}

/// Class at `h:00` proposed through the API; returns its id.
#[allow(dead_code)]
pub async fn propose_class(app: &TestApp, h: u32) -> Uuid {
    let query = r#"
        mutation Propose($input: ProposeSlotInput!) {
            proposeSlot(input: $input) { id }
        }
    "#;
    let variables = Variables::from_json(serde_json::json!({
        "input": {
            "clubId": app.club.id,
            "kind": "CLASS",
            "instructorId": app.instructor.id,
            "startAt": at(h, 0).to_rfc3339(),
        }
    }));
    let response = execute_graphql(&app.schema, query, Some(variables), Some(manager_claims())).await;
    assert!(response.errors.is_empty(), "proposeSlot failed: {:?}", response.errors);
    let data = response.data.into_json().unwrap();
    data["proposeSlot"]["id"].as_str().unwrap().parse().unwrap()
}

/// Books seats through the API and returns the raw response.
#[allow(dead_code)]
pub async fn book(
    app: &TestApp,
    slot_id: Uuid,
    group_size: i32,
    payment: &str,
    claims: Claims,
) -> async_graphql::Response {
    let query = r#"
        mutation Book($slotId: UUID!, $groupSize: Int!, $payment: PaymentMethod!) {
            placeBooking(slotId: $slotId, groupSize: $groupSize, payment: $payment) {
                booking { id status amountPaid pointsPaid isRecycled }
                slot { state courtId recycledSeats }
                confirmation
                courtId
            }
        }
    "#;
    let variables = Variables::from_json(serde_json::json!({
        "slotId": slot_id,
        "groupSize": group_size,
        "payment": payment,
    }));
    execute_graphql(&app.schema, query, Some(variables), Some(claims)).await
}

/// `code` extension of the first error in a response.
#[allow(dead_code)]
pub fn error_code(response: &async_graphql::Response) -> String {
    let error = response.errors.first().expect("expected an error");
    let extensions = serde_json::to_value(&error.extensions).unwrap();
    extensions["code"].as_str().unwrap_or_default().to_string()
}
