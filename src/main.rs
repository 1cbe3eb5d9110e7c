use rocket::{Build, Rocket};
use storefront::{Config, build_rocket};

#[rocket::launch]
fn rocket() -> Rocket<Build> {
    dotenvy::dotenv().ok();

    let config = Config::load().unwrap_or_else(|err| panic!("Failed to load configuration: {}", err));
    build_rocket(config)
}
