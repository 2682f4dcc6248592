pub mod assignment;
pub mod book;
pub mod chapter;
pub mod course;
pub mod part;
