pub mod app;
pub mod config;
pub mod defaults;
pub mod kube;
