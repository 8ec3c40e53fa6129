pub mod activity;
pub mod category;
pub mod item;
pub mod notification;
pub mod report;
pub mod request;
pub mod session;
pub mod unit;
pub mod user;
