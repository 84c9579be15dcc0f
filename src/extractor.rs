/*!
 * Fragment extraction from XHTML sub-documents.
 *
 * Walks a parsed markup tree in document order and yields the translatable
 * text fragments, with the whitespace surrounding each fragment captured
 * separately from the trimmed core so that substitution preserves the
 * original formatting. Extraction is a pure function of the current tree
 * content and holds no cross-call state.
 */

use std::collections::HashSet;

use ego_tree::{NodeId, NodeRef};
use once_cell::sync::Lazy;
use scraper::{Html, Node};

/// Markup regions whose descendant text is never extracted
static SKIP_TAGS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    ["code", "pre", "script", "style", "svg", "math"]
        .into_iter()
        .collect()
});

/// One translatable text run inside a sub-document
#[derive(Debug, Clone, PartialEq)]
pub struct Fragment {
    /// Position of the fragment in the document-order sequence of
    /// translatable text nodes
    pub index: usize,

    /// Whitespace run preceding the core text
    pub leading: String,

    /// Trimmed text eligible for translation
    pub core: String,

    /// Whitespace run following the core text
    pub trailing: String,
}

/// Parse sub-document content into a mutable markup tree
pub fn parse_document(content: &str) -> Html {
    Html::parse_document(content)
}

/// Serialize a markup tree back to sub-document content
pub fn serialize_document(document: &Html) -> String {
    format!("<!DOCTYPE html>\n{}", document.root_element().html())
}

/// Extract the ordered sequence of translatable fragments from a document
///
/// A text node is excluded if its trimmed content is empty or if any of its
/// ancestor elements belongs to the skip set. Comments and other non-text
/// nodes are never considered.
pub fn extract_fragments(document: &Html) -> Vec<Fragment> {
    let mut fragments = Vec::new();

    for node in document.tree.root().descendants() {
        let Node::Text(text) = node.value() else {
            continue;
        };
        if text.text.trim().is_empty() || in_skipped_region(&node) {
            continue;
        }

        let (leading, core, trailing) = split_affixes(&text.text);
        fragments.push(Fragment {
            index: fragments.len(),
            leading: leading.to_string(),
            core: core.to_string(),
            trailing: trailing.to_string(),
        });
    }

    fragments
}

/// Replace the core text of the fragments at positions
/// `start_index .. start_index + replacements.len()`.
///
/// The traversal is recomputed from the current tree content, so the affixes
/// wrapped around each replacement are the ones present in the tree right
/// now. Returns the number of fragments actually replaced.
pub fn apply_replacements(document: &mut Html, start_index: usize, replacements: &[String]) -> usize {
    let end_index = start_index + replacements.len();
    let mut targets: Vec<(NodeId, String)> = Vec::with_capacity(replacements.len());

    for (index, id) in translatable_text_nodes(document).into_iter().enumerate() {
        if index < start_index {
            continue;
        }
        if index >= end_index {
            break;
        }

        if let Some(node) = document.tree.get(id) {
            if let Node::Text(text) = node.value() {
                let (leading, _, trailing) = split_affixes(&text.text);
                let rendered = format!("{}{}{}", leading, replacements[index - start_index], trailing);
                targets.push((id, rendered));
            }
        }
    }

    let applied = targets.len();
    for (id, rendered) in targets {
        if let Some(mut node) = document.tree.get_mut(id) {
            if let Node::Text(text) = node.value() {
                text.text.clear();
                text.text.push_slice(&rendered);
            }
        }
    }

    applied
}

/// Collect the ids of translatable text nodes in document order
fn translatable_text_nodes(document: &Html) -> Vec<NodeId> {
    let mut nodes = Vec::new();

    for node in document.tree.root().descendants() {
        let Node::Text(text) = node.value() else {
            continue;
        };
        if text.text.trim().is_empty() || in_skipped_region(&node) {
            continue;
        }
        nodes.push(node.id());
    }

    nodes
}

/// Whether any ancestor element of the node belongs to the skip set
fn in_skipped_region(node: &NodeRef<'_, Node>) -> bool {
    node.ancestors().any(|ancestor| {
        ancestor
            .value()
            .as_element()
            .is_some_and(|element| SKIP_TAGS.contains(element.name()))
    })
}

fn is_affix_whitespace(c: char) -> bool {
    matches!(c, ' ' | '\t' | '\n' | '\r')
}

/// Split a text run into its leading whitespace, trimmed core and trailing
/// whitespace. A run without any non-whitespace character comes back as
/// all-leading with an empty core.
pub fn split_affixes(text: &str) -> (&str, &str, &str) {
    match text.find(|c: char| !is_affix_whitespace(c)) {
        Some(start) => {
            let last = text
                .rfind(|c: char| !is_affix_whitespace(c))
                .unwrap_or(start);
            let end = last + text[last..].chars().next().map_or(0, char::len_utf8);
            (&text[..start], &text[start..end], &text[end..])
        }
        None => (text, "", ""),
    }
}
