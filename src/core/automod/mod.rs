// Core automod module - rules, config cache and the evaluation pipeline.
// Following the same layering as the other features: no Discord types in here.

pub mod automod_config;
pub mod automod_models;
pub mod automod_service;
pub mod config_cache;
pub mod matchers;
pub mod rules;
pub mod settings_service;

pub use automod_config::*;
pub use automod_models::*;
pub use automod_service::*;
pub use config_cache::*;
pub use rules::*;
pub use settings_service::*;
