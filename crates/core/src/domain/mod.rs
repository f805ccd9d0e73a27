pub mod history;
pub mod inquiry;
pub mod menu;
pub mod option;
pub mod package;
