pub mod healthcheck;
pub mod serve;
