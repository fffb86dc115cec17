pub mod openai_chat;
pub mod openai_responses;
