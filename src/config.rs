use rocket::figment::Figment;
use serde::Deserialize;

/// Application settings read from the same figment Rocket uses, so they can
/// be set in `Rocket.toml` or through `ROCKET_DATABASE`.
#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct AppConfig {
    #[serde(default = "default_database")]
    pub database: String,
}

fn default_database() -> String {
    "syariahos.db".to_string()
}

impl AppConfig {
    pub fn from_figment(figment: &Figment) -> Result<AppConfig, rocket::figment::Error> {
        figment.extract()
    }
}
