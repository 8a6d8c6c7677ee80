use crate::error::IntakeError;
use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};
use serde_json::Value;
use std::fmt;

/// The marketplace's closed set of product categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    Sports,
    Grocery,
    Electronics,
    Pharmacy,
    FashionApparel,
    FoodBakery,
    BooksStationery,
    Hardware,
    HomeDecor,
    Other,
}

impl Category {
    pub const ALL: [Category; 10] = [
        Category::Sports,
        Category::Grocery,
        Category::Electronics,
        Category::Pharmacy,
        Category::FashionApparel,
        Category::FoodBakery,
        Category::BooksStationery,
        Category::Hardware,
        Category::HomeDecor,
        Category::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Sports => "Sports",
            Category::Grocery => "Grocery",
            Category::Electronics => "Electronics",
            Category::Pharmacy => "Pharmacy",
            Category::FashionApparel => "Fashion & Apparel",
            Category::FoodBakery => "Food & Bakery",
            Category::BooksStationery => "Books & Stationery",
            Category::Hardware => "Hardware",
            Category::HomeDecor => "Home Decor",
            Category::Other => "Other",
        }
    }

    /// Matches ignoring case and whitespace. Anything unrecognized becomes `Other`.
    pub fn coerce(raw: &str) -> Category {
        let raw = squash(raw);
        Self::ALL
            .into_iter()
            .find(|c| squash(c.as_str()).eq_ignore_ascii_case(&raw))
            .unwrap_or(Category::Other)
    }

    /// Comma separated list, as embedded in the system instruction.
    pub fn list() -> String {
        Self::ALL
            .iter()
            .map(Category::as_str)
            .collect::<Vec<_>>()
            .join(", ")
    }
}

fn squash(s: &str) -> String {
    s.split_whitespace().collect()
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Category {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// A validated purchase intent. Built only by a [`FinalizationDetector`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructuredIntent {
    summary: String,
    category: Category,
}

impl StructuredIntent {
    pub fn summary(&self) -> &str {
        &self.summary
    }

    pub fn category(&self) -> Category {
        self.category
    }
}

impl Serialize for StructuredIntent {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut s = serializer.serialize_struct("StructuredIntent", 3)?;
        s.serialize_field("finalized", &true)?;
        s.serialize_field("summary", &self.summary)?;
        s.serialize_field("category", &self.category)?;
        s.end()
    }
}

/// Decides whether a model reply carries the end-of-intake payload.
pub trait FinalizationDetector: Send + Sync {
    fn detect(&self, reply: &str) -> Option<StructuredIntent>;
}

/// Takes the first balanced `{...}` region of the reply and parses it as JSON.
///
/// Prose and code fences around the object are ignored. Braces inside JSON
/// string literals do not count toward the balance.
#[derive(Debug, Default, Clone, Copy)]
pub struct BalancedBraceDetector;

impl FinalizationDetector for BalancedBraceDetector {
    fn detect(&self, reply: &str) -> Option<StructuredIntent> {
        match parse_intent(reply) {
            Ok(intent) => intent,
            Err(e) => {
                tracing::debug!("Reply not finalized: {}", e);
                None
            }
        }
    }
}

/// `Ok(None)` when the reply holds no object at all; `Err` when it holds one
/// that does not qualify.
fn parse_intent(reply: &str) -> Result<Option<StructuredIntent>, IntakeError> {
    let Some(region) = extract_first_object(reply) else {
        return Ok(None);
    };
    let value: Value = serde_json::from_str(region)
        .map_err(|e| IntakeError::MalformedFinalization(format!("invalid JSON: {e}")))?;

    if value.get("finalized").and_then(Value::as_bool) != Some(true) {
        return Err(IntakeError::MalformedFinalization(
            "`finalized` is not true".into(),
        ));
    }
    let summary = value
        .get("summary")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| IntakeError::MalformedFinalization("missing summary".into()))?;
    let category = value
        .get("category")
        .and_then(Value::as_str)
        .map(Category::coerce)
        .unwrap_or(Category::Other);

    Ok(Some(StructuredIntent {
        summary: summary.to_string(),
        category,
    }))
}

/// Returns the text from the first `{` to its matching `}`, or `None` if the
/// braces never balance.
pub fn extract_first_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAYLOAD: &str =
        r#"{"finalized": true, "summary": "SG cricket bat, size 6", "category": "Sports"}"#;

    #[test]
    fn test_exact_payload() {
        let intent = BalancedBraceDetector.detect(PAYLOAD).unwrap();
        assert_eq!(intent.summary(), "SG cricket bat, size 6");
        assert_eq!(intent.category(), Category::Sports);
    }

    #[test]
    fn test_prose_and_fences_do_not_matter() {
        let wrapped = [
            format!("Theek hai! Here is your order:\n{PAYLOAD}\nShops will reply soon."),
            format!("```json\n{PAYLOAD}\n```"),
            format!("Done. ```\n{PAYLOAD}``` bye"),
        ];
        let bare = BalancedBraceDetector.detect(PAYLOAD);
        for reply in wrapped {
            assert_eq!(BalancedBraceDetector.detect(&reply), bare, "{reply}");
        }
    }

    #[test]
    fn test_braces_inside_strings() {
        let reply = r#"ok {"finalized": true, "summary": "bat {size 6} with \"grip\"", "category": "sports"} trailing }"#;
        let intent = BalancedBraceDetector.detect(reply).unwrap();
        assert_eq!(intent.summary(), "bat {size 6} with \"grip\"");
        assert_eq!(intent.category(), Category::Sports);
    }

    #[test]
    fn test_rejections() {
        let cases = [
            "What size do you need?",
            r#"{"finalized": true, "summary": "bat""#,
            r#"{"finalized": false, "summary": "bat", "category": "Sports"}"#,
            r#"{"summary": "bat", "category": "Sports"}"#,
            r#"{"finalized": true, "summary": "  ", "category": "Sports"}"#,
            r#"{"finalized": "true", "summary": "bat", "category": "Sports"}"#,
            "{not json at all}",
        ];
        for reply in cases {
            assert!(BalancedBraceDetector.detect(reply).is_none(), "{reply}");
        }
    }

    #[test]
    fn test_category_coercion() {
        assert_eq!(Category::coerce("  sports "), Category::Sports);
        assert_eq!(Category::coerce("FOOD & BAKERY"), Category::FoodBakery);
        assert_eq!(Category::coerce("home decor"), Category::HomeDecor);
        assert_eq!(Category::coerce("home  decor"), Category::HomeDecor);
        assert_eq!(Category::coerce("Fashion&Apparel"), Category::FashionApparel);
        assert_eq!(
            Category::coerce("books &\tstationery"),
            Category::BooksStationery
        );
        assert_eq!(Category::coerce("Hard ware"), Category::Hardware);
        assert_eq!(Category::coerce("Toys"), Category::Other);
        assert_eq!(Category::coerce(""), Category::Other);

        let reply = r#"{"finalized": true, "summary": "Lego set", "category": "Toys"}"#;
        assert_eq!(
            BalancedBraceDetector.detect(reply).unwrap().category(),
            Category::Other
        );
        let no_category = r#"{"finalized": true, "summary": "Lego set"}"#;
        assert_eq!(
            BalancedBraceDetector.detect(no_category).unwrap().category(),
            Category::Other
        );
    }

    #[test]
    fn test_intent_serializes_finalized_flag() {
        let intent = BalancedBraceDetector.detect(PAYLOAD).unwrap();
        let json = serde_json::to_value(&intent).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "finalized": true,
                "summary": "SG cricket bat, size 6",
                "category": "Sports"
            })
        );
    }

    #[test]
    fn test_extract_first_object_only() {
        let text = r#"a {"x": {"y": 1}} b {"z": 2}"#;
        assert_eq!(extract_first_object(text), Some(r#"{"x": {"y": 1}}"#));
        assert_eq!(extract_first_object("no braces"), None);
        assert_eq!(extract_first_object("{ open"), None);
    }
}
