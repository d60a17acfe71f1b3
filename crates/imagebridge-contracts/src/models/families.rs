use indexmap::IndexMap;

/// How an image edit reaches the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EditProtocol {
    /// Base image and mask embedded as image parts of one chat message.
    EmbeddedChat,
    /// Multipart upload to a dedicated `images/edits` endpoint.
    EditEndpoint,
}

impl EditProtocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::EmbeddedChat => "embedded_chat",
            Self::EditEndpoint => "edit_endpoint",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelFamily {
    pub name: String,
    pub protocol: EditProtocol,
}

impl ModelFamily {
    /// Case-insensitive substring match against a full model identifier
    /// such as `google/gemini-2.5-flash-image`.
    pub fn matches(&self, model_id: &str) -> bool {
        model_id
            .to_ascii_lowercase()
            .contains(&self.name.to_ascii_lowercase())
    }
}

/// Closed dispatch table from model family to edit protocol. Families are
/// tried in insertion order; unmatched identifiers use the fallback.
#[derive(Debug, Clone)]
pub struct ModelFamilyTable {
    families: IndexMap<String, ModelFamily>,
    fallback: EditProtocol,
}

impl Default for ModelFamilyTable {
    fn default() -> Self {
        Self::new(None)
    }
}

impl ModelFamilyTable {
    pub fn new(families: Option<IndexMap<String, ModelFamily>>) -> Self {
        Self {
            families: families.unwrap_or_else(default_families),
            fallback: EditProtocol::EditEndpoint,
        }
    }

    pub fn get(&self, name: &str) -> Option<&ModelFamily> {
        self.families.get(name)
    }

    pub fn list(&self) -> impl Iterator<Item = &ModelFamily> {
        self.families.values()
    }

    pub fn family_for(&self, model_id: &str) -> Option<&ModelFamily> {
        self.families
            .values()
            .find(|family| family.matches(model_id))
    }

    pub fn protocol_for(&self, model_id: &str) -> EditProtocol {
        self.family_for(model_id)
            .map(|family| family.protocol)
            .unwrap_or(self.fallback)
    }
}

fn default_families() -> IndexMap<String, ModelFamily> {
    let mut map = IndexMap::new();

    let mut insert = |name: &str, protocol: EditProtocol| {
        map.insert(
            name.to_string(),
            ModelFamily {
                name: name.to_string(),
                protocol,
            },
        );
    };

    insert("gemini", EditProtocol::EmbeddedChat);
    insert("gpt-image", EditProtocol::EditEndpoint);
    insert("dall-e", EditProtocol::EditEndpoint);

    map
}
