pub mod brands;
pub mod core;
pub mod courses;
pub mod curriculum;
pub mod learner;
pub mod lessons;
pub mod onboarding;
pub mod quizzes;
pub mod session;
pub mod setup;
pub mod users;
