//! Fixed instruction prompts for the normalization oracle.
//!
//! One template per normalization kind. Provider-agnostic.

use crate::corpus::NormalizationKind;
use crate::gateway::Message;

/// A normalization prompt: fixed system instruction plus a user-turn template
/// with a `{raw_text}` placeholder.
#[derive(Debug, Clone, Copy)]
pub struct PromptTemplate {
    pub slug: &'static str,
    pub system: &'static str,
    pub user: &'static str,
}

impl PromptTemplate {
    pub fn render(&self, raw_text: &str) -> Vec<Message> {
        let user = self.user.replace("{raw_text}", raw_text.trim());
        vec![Message::system(self.system), Message::user(user)]
    }
}

pub const AFFILIATION_PROMPT: PromptTemplate = PromptTemplate {
    slug: "affiliation_v1",
    system: r#"You are an expert in data normalization and entity resolution. Your task is to normalize raw affiliation strings to standardized organization names.
You will be provided with a mapping dictionary of raw affiliation variants and their corresponding normalized names.
Your goal is to match a given input affiliation string to the correct normalized affiliation,
using the rules implied by the mapping.

Rules to follow:
1. Normalize abbreviations and acronyms to full institution names.
2. Handle punctuation, spacing, and capitalization inconsistencies.
3. Recognize when brand names or departments belong to a parent company or university and map accordingly.
4. Account for multilingual or localized versions of university or organization names.
5. If an affiliation cannot be matched to any known mapping, return "Unknown".

Input:
You will receive a string representing a person's affiliation.

Output:
Return the normalized name. Do not add any additional text in the output please.

Example:
If the input is "UC Berkeley", return "University of California, Berkeley".
If the input is "ATT", return "AT&T".
If the input is "Futurewei", return "Huawei".
If the input is "Independent researcher", return "Unknown".

Use fuzzy matching or logical rules if needed, but ensure high precision."#,
    user: r#"Task:
Normalize these affiliations:
{raw_text}"#,
};

pub const ADDRESS_PROMPT: PromptTemplate = PromptTemplate {
    slug: "address_v1",
    system: r#"Which country and continent is this address located in?
Simply return a JSON object with two fields: "country" and "continent".
Make sure the names are in consistent format.
For example, dont use U.S for one address and United States of America for other.
Write complete names only always.

Return ONLY the JSON object in this format:
{"country": "country name", "continent": "continent name"}"#,
    user: "{raw_text}",
};

/// Select the template for a normalization kind.
pub fn prompt_for(kind: NormalizationKind) -> PromptTemplate {
    match kind {
        NormalizationKind::Affiliation => AFFILIATION_PROMPT,
        NormalizationKind::Address => ADDRESS_PROMPT,
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::Role;

    #[test]
    fn affiliation_render() {
        let messages = AFFILIATION_PROMPT.render("UC Berkeley");
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, Role::System);
        assert!(messages[0].content.contains("entity resolution"));
        assert!(messages[1].content.ends_with("UC Berkeley"));
    }

    #[test]
    fn address_render_is_bare_text() {
        let messages = ADDRESS_PROMPT.render("  1 rue de Rivoli, Paris ");
        assert_eq!(messages[1].content, "1 rue de Rivoli, Paris");
        assert!(messages[0].content.contains("country"));
    }

    #[test]
    fn prompt_selection() {
        assert_eq!(
            prompt_for(NormalizationKind::Affiliation).slug,
            "affiliation_v1"
        );
        assert_eq!(prompt_for(NormalizationKind::Address).slug, "address_v1");
    }
}
