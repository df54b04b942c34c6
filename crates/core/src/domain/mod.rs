pub mod adjustment;
pub mod commission_config;
pub mod development;
pub mod distribution;
pub mod partner;
pub mod rule;
pub mod sale;
