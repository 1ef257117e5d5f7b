use goose::prelude::*;
use initdata::config::BotToken;
use initdata::signature::{InitDataVerifier, SigningFields};
use rand::Rng;

/// Load testing suite for the init data verification service.
///
/// Simulates Mini App launches hitting the backend:
/// - Genuinely signed payloads (full HMAC verification path)
/// - Forged payloads (rejection path, must cost the same as success)
/// - Profile photo lookups (cache hit path after warmup)
/// - Health monitoring endpoint
///
/// The server under test must run with the same `BOT_TOKEN` as the load test
/// and with `DISABLE_RATE_LIMIT` set.
///
/// # Usage
/// ```bash
/// cd loadtest
/// BOT_TOKEN=123:abc cargo run --release -- --host http://localhost:5000 --users 10 --hatch-rate 2 --run-time 60s
/// ```
///
/// # Performance Targets
/// - Verification: <5ms p95 latency
/// - Cached photo lookups: <10ms p95 latency
/// - Error rate: <1% (forged payloads are expected 403s and not counted)

#[tokio::main]
async fn main() -> Result<(), GooseError> {
    GooseAttack::initialize()?
        .register_scenario(
            scenario!("Verification")
                .register_transaction(transaction!(verify_signed).set_weight(10)?)
                .register_transaction(transaction!(verify_forged).set_weight(3)?)
                .register_transaction(transaction!(health_check).set_weight(1)?)
        )
        .register_scenario(
            scenario!("ProfilePhotos")
                // Small user id range keeps lookups mostly cache hits
                .register_transaction(transaction!(profile_photo).set_weight(5)?)
        )
        .execute()
        .await?;

    Ok(())
}

fn verifier() -> InitDataVerifier {
    let token = std::env::var("BOT_TOKEN").unwrap_or_else(|_| "local-dev-token".into());
    InitDataVerifier::new(&BotToken::new(token))
}

/// Launch fields resembling what the platform sends.
fn launch_fields() -> SigningFields {
    let user_id = rand::thread_rng().gen_range(1..1_000_000);
    let mut fields = SigningFields::new();
    fields.insert("auth_date".into(), chrono::Utc::now().timestamp().to_string());
    fields.insert("query_id".into(), format!("AAH{}", user_id));
    fields.insert(
        "user".into(),
        format!(r#"{{"id":{},"first_name":"Load","username":"load_{}"}}"#, user_id, user_id),
    );
    fields
}

async fn post_init_data(user: &mut GooseUser, init_data: String) -> Result<GooseResponse, Box<TransactionError>> {
    let body = serde_json::json!({ "initData": init_data });
    user.post_json("/verify_init", &body).await
}

/// Posts a correctly signed payload; expects 200.
async fn verify_signed(user: &mut GooseUser) -> TransactionResult {
    let init_data = verifier().signed_payload(&launch_fields());
    let _goose = post_init_data(user, init_data).await?;
    Ok(())
}

/// Posts a payload whose signature was computed over different fields; expects 403.
async fn verify_forged(user: &mut GooseUser) -> TransactionResult {
    let hash = verifier().sign(&launch_fields());
    let init_data = format!("auth_date={}&user=%7B%22id%22%3A1%7D&hash={}", chrono::Utc::now().timestamp(), hash);

    let mut goose = post_init_data(user, init_data).await?;
    if let Ok(response) = &goose.response {
        if response.status().as_u16() == 403 {
            return user.set_success(&mut goose.request);
        }
    }
    Ok(())
}

/// Looks up profile photos for a small pool of user ids.
async fn profile_photo(user: &mut GooseUser) -> TransactionResult {
    let user_id = rand::thread_rng().gen_range(1..50);
    let _goose = user.get(&format!("/get_profile_photo?user_id={}", user_id)).await?;
    Ok(())
}

/// Monitors service availability via health check endpoint.
async fn health_check(user: &mut GooseUser) -> TransactionResult {
    let _goose = user.get("/health").await?;
    Ok(())
}
