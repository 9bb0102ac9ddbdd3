//! Prompt template for single-label news classification.
//!
//! Provider-agnostic: renders messages, never calls the service.

use crate::articles::CategorySet;
use crate::gateway::Message;

/// Rendered prompt ready for the LLM.
#[derive(Debug, Clone)]
pub struct PromptInstance {
    pub template_slug: String,
    pub system: String,
    pub user: String,
}

impl PromptInstance {
    pub fn to_messages(&self) -> Vec<Message> {
        vec![Message::system(&self.system), Message::user(&self.user)]
    }
}

/// A prompt template with `{categories}` and `{article}` placeholders.
#[derive(Debug, Clone, Copy)]
pub struct PromptTemplate {
    pub slug: &'static str,
    pub system: &'static str,
    pub user: &'static str,
}

impl PromptTemplate {
    pub fn render(&self, categories: &CategorySet, article: &str) -> PromptInstance {
        let listing = categories
            .iter()
            .map(|c| format!("- {c}"))
            .collect::<Vec<_>>()
            .join("\n");

        // Article last so its text can't collide with the category placeholder.
        let user = self
            .user
            .replace("{categories}", &listing)
            .replace("{article}", article);

        PromptInstance {
            template_slug: self.slug.to_string(),
            system: self.system.to_string(),
            user,
        }
    }
}

pub const CLASSIFY_V1: PromptTemplate = PromptTemplate {
    slug: "news_classify_v1",
    system: "You are a news article classifier. Respond only with the category name.",
    user: r#"Classify the following news article into exactly ONE of these categories:
{categories}

Article: {article}

Respond with ONLY the category name in lowercase, nothing else."#,
};

pub const DEFAULT_PROMPT: PromptTemplate = CLASSIFY_V1;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_lists_every_category_in_order() {
        let p = DEFAULT_PROMPT.render(&CategorySet::bbc_news(), "Shares rose sharply.");
        assert!(p.user.starts_with(
            "Classify the following news article into exactly ONE of these categories:\n- business\n- tech\n- sport\n- politics\n- entertainment\n"
        ));
        assert!(p.user.contains("Article: Shares rose sharply."));
        assert!(p.user.ends_with("nothing else."));
        assert!(p.system.contains("classifier"));
    }

    #[test]
    fn article_text_is_not_reinterpreted() {
        let p = DEFAULT_PROMPT.render(&CategorySet::bbc_news(), "literal {categories}");
        assert!(p.user.contains("Article: literal {categories}"));
    }

    #[test]
    fn messages_are_system_then_user() {
        let p = DEFAULT_PROMPT.render(&CategorySet::bbc_news(), "text");
        let messages = p.to_messages();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, crate::gateway::Role::System);
        assert_eq!(messages[1].role, crate::gateway::Role::User);
    }
}
