pub mod core;
pub mod exams;
pub mod marks;
pub mod sections;
pub mod sessions;
pub mod subjects;
pub mod users;
