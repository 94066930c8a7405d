use serde::{ Deserialize, Serialize };

/// A static topic article the mentor can point users at.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuideDocument {
    pub id: String,
    pub title: String,
    pub description: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default, alias = "content")]
    pub body: String,
    #[serde(default, alias = "promptExample", skip_serializing_if = "Option::is_none")]
    pub example: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuideCategory {
    pub id: String,
    pub label: String,
    #[serde(default)]
    pub items: Vec<GuideDocument>,
}

/// The full, ordered guide catalog. Iteration order is category order, then
/// item order, and is the tie-break order for relevance ranking.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuideCatalog {
    #[serde(default)]
    pub categories: Vec<GuideCategory>,
}

impl GuideCatalog {
    pub fn from_documents(label: &str, documents: Vec<GuideDocument>) -> Self {
        Self {
            categories: vec![GuideCategory {
                id: label.to_lowercase(),
                label: label.to_string(),
                items: documents,
            }],
        }
    }

    pub fn documents(&self) -> impl Iterator<Item = &GuideDocument> {
        self.categories.iter().flat_map(|c| c.items.iter())
    }

    pub fn get(&self, id: &str) -> Option<&GuideDocument> {
        self.documents().find(|d| d.id == id)
    }

    pub fn len(&self) -> usize {
        self.documents().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn ids(&self) -> Vec<&str> {
        self.documents()
            .map(|d| d.id.as_str())
            .collect()
    }

    /// Category list injected into the base persona prompt.
    pub fn category_list(&self) -> String {
        self.categories
            .iter()
            .map(|c| {
                let items = c.items
                    .iter()
                    .map(|i| format!("- **{}** (id: {}): {}", i.title, i.id, i.description))
                    .collect::<Vec<_>>()
                    .join("\n");
                format!("### {}\n{}", c.label, items)
            })
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(id: &str) -> GuideDocument {
        GuideDocument {
            id: id.to_string(),
            title: id.to_uppercase(),
            description: format!("{} guide", id),
            tags: vec![],
            body: String::new(),
            example: None,
        }
    }

    #[test]
    fn documents_follow_category_order() {
        let catalog = GuideCatalog {
            categories: vec![
                GuideCategory { id: "a".into(), label: "A".into(), items: vec![doc("x"), doc("y")] },
                GuideCategory { id: "b".into(), label: "B".into(), items: vec![doc("z")] }
            ],
        };
        assert_eq!(catalog.ids(), vec!["x", "y", "z"]);
        assert_eq!(catalog.len(), 3);
        assert_eq!(catalog.get("z").map(|d| d.title.as_str()), Some("Z"));
        assert!(catalog.get("missing").is_none());
    }

    #[test]
    fn category_list_renders_each_category() {
        let catalog = GuideCatalog {
            categories: vec![
                GuideCategory { id: "a".into(), label: "UI".into(), items: vec![doc("cards")] },
                GuideCategory { id: "b".into(), label: "Design".into(), items: vec![doc("spacing")] }
            ],
        };
        assert_eq!(
            catalog.category_list(),
            "### UI\n- **CARDS** (id: cards): cards guide\n\n### Design\n- **SPACING** (id: spacing): spacing guide"
        );
    }

    #[test]
    fn accepts_content_and_prompt_example_aliases() {
        let d: GuideDocument = serde_json
            ::from_str(
                r#"{"id":"cards","title":"카드","description":"d","tags":["ui"],"content":"body","promptExample":"ex"}"#
            )
            .unwrap();
        assert_eq!(d.body, "body");
        assert_eq!(d.example.as_deref(), Some("ex"));
    }
}
