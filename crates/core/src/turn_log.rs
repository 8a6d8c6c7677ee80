use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// Base64 image data with its MIME type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InlineImage {
    pub mime_type: String,
    pub data: String,
}

impl InlineImage {
    pub fn new(mime_type: &str, data: &str) -> Self {
        Self {
            mime_type: mime_type.to_string(),
            data: data.to_string(),
        }
    }

    /// Parses a `data:<mime>;base64,<data>` URL.
    pub fn from_data_url(url: &str) -> Option<Self> {
        let rest = url.strip_prefix("data:")?;
        let (header, data) = rest.split_once(',')?;
        let mime_type = header.strip_suffix(";base64")?;
        if mime_type.is_empty() || data.is_empty() {
            return None;
        }
        Some(Self::new(mime_type, data))
    }

    pub fn to_data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.data)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Part {
    Text(String),
    InlineImage(InlineImage),
}

/// A map link returned alongside a text reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroundingLink {
    pub uri: String,
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConversationTurn {
    pub role: Role,
    pub parts: Vec<Part>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub grounding: Vec<GroundingLink>,
}

impl ConversationTurn {
    /// A user turn. Empty text is left out so an image-only turn has one part.
    pub fn user(text: &str, image: Option<InlineImage>) -> Self {
        let mut parts = Vec::new();
        if !text.is_empty() {
            parts.push(Part::Text(text.to_string()));
        }
        if let Some(image) = image {
            parts.push(Part::InlineImage(image));
        }
        Self {
            role: Role::User,
            parts,
            grounding: Vec::new(),
        }
    }

    pub fn assistant(text: &str) -> Self {
        Self {
            role: Role::Assistant,
            parts: vec![Part::Text(text.to_string())],
            grounding: Vec::new(),
        }
    }

    pub fn with_grounding(mut self, grounding: Vec<GroundingLink>) -> Self {
        self.grounding = grounding;
        self
    }

    /// All text parts joined by newlines.
    pub fn text(&self) -> String {
        self.parts
            .iter()
            .filter_map(|p| match p {
                Part::Text(t) => Some(t.as_str()),
                Part::InlineImage(_) => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn image(&self) -> Option<&InlineImage> {
        self.parts.iter().find_map(|p| match p {
            Part::InlineImage(img) => Some(img),
            Part::Text(_) => None,
        })
    }
}

/// Append-only conversation history. Order is the context sent to the model.
#[derive(Debug, Clone, Default)]
pub struct TurnLog {
    turns: Vec<ConversationTurn>,
}

impl TurnLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, turn: ConversationTurn) {
        self.turns.push(turn);
    }

    pub fn turns(&self) -> &[ConversationTurn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn last(&self) -> Option<&ConversationTurn> {
        self.turns.last()
    }

    /// Drops every turn. Used only when the owning session ends.
    pub(crate) fn discard(&mut self) {
        self.turns.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_turn_parts() {
        let img = InlineImage::new("image/jpeg", "AAAA");
        let turn = ConversationTurn::user("cricket bat", Some(img.clone()));
        assert_eq!(turn.parts.len(), 2);
        assert_eq!(turn.text(), "cricket bat");
        assert_eq!(turn.image(), Some(&img));

        let image_only = ConversationTurn::user("", Some(img));
        assert_eq!(image_only.parts.len(), 1);
        assert_eq!(image_only.text(), "");
    }

    #[test]
    fn test_log_preserves_order() {
        let mut log = TurnLog::new();
        log.append(ConversationTurn::user("a", None));
        log.append(ConversationTurn::assistant("b"));
        log.append(ConversationTurn::user("c", None));

        let texts: Vec<String> = log.turns().iter().map(|t| t.text()).collect();
        assert_eq!(texts, vec!["a", "b", "c"]);
        assert_eq!(log.last().unwrap().role, Role::User);

        log.discard();
        assert!(log.is_empty());
    }

    #[test]
    fn test_data_url() {
        let img = InlineImage::from_data_url("data:image/png;base64,iVBORw0").unwrap();
        assert_eq!(img.mime_type, "image/png");
        assert_eq!(img.data, "iVBORw0");
        assert_eq!(img.to_data_url(), "data:image/png;base64,iVBORw0");

        assert!(InlineImage::from_data_url("data:image/png,raw").is_none());
        assert!(InlineImage::from_data_url("https://example.com/a.png").is_none());
    }
}
