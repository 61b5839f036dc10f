// Provider defaults and the fixed generation instruction.

use std::env;

use serde_json::{json, Value};

use crate::post::{Category, MAX_TAGS, MIN_TAGS, TITLE_MAX_CHARS};

pub const API_KEY_ENV: &str = "OPENAI_API_KEY";
pub const BASE_URL_ENV: &str = "OPENAI_BASE_URL";
pub const MODEL_ENV: &str = "POSTCRAFT_MODEL";

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-4o-2024-08-06";
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Models known to honour `json_schema` response formats.
pub const COMPATIBLE_MODELS: [&str; 4] = [
    "gpt-4o-2024-08-06",
    "gpt-4o",
    "gpt-4o-mini",
    "gpt-4-turbo",
];

pub const TEMPERATURE: f64 = 0.7;
pub const MAX_TOKENS: u32 = 2000;
pub const PING_MAX_TOKENS: u32 = 5;

pub const DEFAULT_SAVE_NAME: &str = "social_post";
pub const SAVE_EXTENSION: &str = "txt";

lazy_static::lazy_static! {
    pub static ref OPENAI_BASE_URL: String =
        env::var(BASE_URL_ENV).unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
    pub static ref SYSTEM_PROMPT: String = build_system_prompt();
    pub static ref RESPONSE_FORMAT: Value = build_response_format();
}

fn build_system_prompt() -> String {
    format!(
        r#"You are an expert writer of professional social-media content.

Your job is to write engaging, high-quality posts that start conversations.

Guidelines:
1. TITLE: catchy, concise and attention-grabbing (at most {TITLE_MAX_CHARS} characters).
2. BODY:
   - Write between 200 and 500 words.
   - Use a professional but approachable tone.
   - Give the reader real value.
   - Structure the text in short, easy-to-read paragraphs.
   - Place between 1 and 5 emoji strategically to help readability.
   - Finish with a call to action.
3. TAGS:
   - Provide between {MIN_TAGS} and {MAX_TAGS} relevant hashtags.
   - Mix popular and niche hashtags.
   - Do not include the # symbol; it is added automatically.
4. CATEGORY:
   - Choose the most fitting category: {categories}.

Adapt tone and content to the idea the user provides."#,
        categories = Category::valid_options(),
    )
}

fn build_response_format() -> Value {
    json!({
        "type": "json_schema",
        "json_schema": {
            "name": "generated_post",
            "strict": true,
            "schema": {
                "type": "object",
                "properties": {
                    "title": {
                        "type": "string",
                        "description": "Catchy, descriptive post title"
                    },
                    "body": {
                        "type": "string",
                        "description": "Main post text with real, professional value"
                    },
                    "tags": {
                        "type": "array",
                        "items": { "type": "string" },
                        "description": "Relevant hashtags without the # symbol"
                    },
                    "category": {
                        "type": "string",
                        "description": format!("One of: {}", Category::valid_options())
                    }
                },
                "required": ["title", "body", "tags", "category"],
                "additionalProperties": false
            }
        }
    })
}
