pub mod media;
pub mod openai;
