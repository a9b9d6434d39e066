use chrono::Duration;
use std::env;
use uuid::Uuid;

use devfolio_backend::routes::session::create_access_token;

fn main() {
    dotenvy::dotenv().ok();

    let mut args = env::args().skip(1);
    let user_id = args.next().and_then(|s| Uuid::parse_str(&s).ok()).unwrap_or_else(|| {
        eprintln!("Usage: cargo run --bin mint-token <PROFILE_UUID> [EMAIL] [TTL_MINUTES]");
        std::process::exit(1);
    });
    let email = args.next().unwrap_or_else(|| "dev@localhost".to_string());
    let ttl_minutes: i64 = args.next().and_then(|s| s.parse().ok()).unwrap_or(60);

    match create_access_token(user_id, &email, Duration::minutes(ttl_minutes)) {
        Ok(token) => {
            println!("\nProfile : {}", user_id);
            println!("Email   : {}", email);
            println!("Expires : in {} minutes\n", ttl_minutes);
            println!("# Use as a bearer token:");
            println!("Authorization: Bearer {}", token);
        }
        Err(e) => {
            eprintln!("Error signing token: {}", e);
            std::process::exit(1);
        }
    }
}
