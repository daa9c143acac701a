use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::errors::{AppError, AppResult};

/// Element types understood by the dashboard renderer.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ElementType {
    Section,
    Card,
    Markdown,
    Table,
    List,
    Metric,
    Badge,
    Callout,
}

impl ElementType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Section => "Section",
            Self::Card => "Card",
            Self::Markdown => "Markdown",
            Self::Table => "Table",
            Self::List => "List",
            Self::Metric => "Metric",
            Self::Badge => "Badge",
            Self::Callout => "Callout",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VisualizationElement {
    #[serde(rename = "type")]
    pub element_type: ElementType,
    pub props: Value,
    #[serde(default)]
    pub children: Vec<String>,
}

/// Declarative render description: a root id plus a flat element map.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VisualizationTree {
    pub root: String,
    pub elements: BTreeMap<String, VisualizationElement>,
}

impl VisualizationTree {
    pub fn root_element(&self) -> Option<&VisualizationElement> {
        self.elements.get(&self.root)
    }

    pub fn root_children(&self) -> &[String] {
        self.root_element()
            .map(|element| element.children.as_slice())
            .unwrap_or(&[])
    }

    pub fn validate(&self) -> AppResult<()> {
        if !self.elements.contains_key(&self.root) {
            return Err(AppError::Internal(format!(
                "visualization root {} missing",
                self.root
            )));
        }
        let mut parented = HashSet::new();
        for (id, element) in &self.elements {
            for child in &element.children {
                if child == id || child == &self.root {
                    return Err(AppError::Internal(format!(
                        "visualization element {id} points back to {child}"
                    )));
                }
                if !self.elements.contains_key(child) {
                    return Err(AppError::Internal(format!(
                        "visualization element {id} references missing child {child}"
                    )));
                }
                if !parented.insert(child.as_str()) {
                    return Err(AppError::Internal(format!(
                        "visualization element {child} has more than one parent"
                    )));
                }
            }
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct TreeBuilder {
    elements: BTreeMap<String, VisualizationElement>,
}

impl TreeBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(
        &mut self,
        id: impl Into<String>,
        element_type: ElementType,
        props: Value,
        children: Vec<String>,
    ) -> String {
        let id = id.into();
        self.elements.insert(
            id.clone(),
            VisualizationElement {
                element_type,
                props,
                children,
            },
        );
        id
    }

    pub fn build(self, root: impl Into<String>) -> AppResult<VisualizationTree> {
        let tree = VisualizationTree {
            root: root.into(),
            elements: self.elements,
        };
        tree.validate()?;
        Ok(tree)
    }
}

#[cfg(test)]
mod tests {
    use super::{ElementType, TreeBuilder};
    use serde_json::json;

    #[test]
    fn builder_rejects_dangling_children() {
        let mut builder = TreeBuilder::new();
        builder.add("root", ElementType::Section, json!({}), vec!["missing".to_string()]);
        assert!(builder.build("root").is_err());
    }

    #[test]
    fn tree_serializes_type_field() {
        let mut builder = TreeBuilder::new();
        let child = builder.add("summary", ElementType::Markdown, json!({"text": "x"}), vec![]);
        builder.add("root", ElementType::Section, json!({}), vec![child]);
        let tree = builder.build("root").expect("valid tree");
        let value = serde_json::to_value(&tree).expect("serialize");
        assert_eq!(value["root"], "root");
        assert_eq!(value["elements"]["summary"]["type"], "Markdown");
        assert_eq!(tree.root_children(), ["summary".to_string()]);
    }
}
