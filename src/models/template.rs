use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Template {
    pub code: String,
    pub language: String,
    pub content: TemplateContent,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateContent {
    pub subject: String,
    pub body: String,
}
