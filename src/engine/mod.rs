// Book reconstruction from partial/insert/update/delete messages
pub mod book;
pub mod types;
