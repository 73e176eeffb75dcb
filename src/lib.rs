mod app;
mod application;
mod domain;
mod infrastructure;
mod interfaces;

pub use app::run;
