//! Public tool names
//!
//! Upstream product identifiers are opaque, so each tool is exposed to the
//! client under a name derived from the readable head of its description
//! ("Smart Math — does math" becomes `Smart-Math`). The registry remembers
//! which upstream identifier every exposed name stands for.

use crate::api::ToolDescriptor;
use std::collections::HashMap;

/// Maximum length of a client-visible tool name
pub const MAX_NAME_LEN: usize = 64;

/// Checked in this order; the first one present wins.
const SEPARATORS: [&str; 4] = [" — ", " - ", " – ", "|"];

const SENTENCE_SCAN_LIMIT: usize = 100;
const FALLBACK_CHARS: usize = 50;
const FALLBACK_NAME: &str = "tool";

/// Derive a client-safe name from a tool description.
///
/// The result contains only ASCII letters, digits, `-` and `_`, is at most
/// [`MAX_NAME_LEN`] characters and never ends with `-`. It may be empty when
/// the description has no usable characters.
pub fn derive_public_name(description: &str) -> String {
    sanitize(readable_part(description))
}

fn readable_part(description: &str) -> &str {
    let head = SEPARATORS
        .iter()
        .find_map(|sep| description.find(sep).filter(|&idx| idx > 0))
        .map(|idx| description[..idx].trim())
        .unwrap_or("");
    if !head.is_empty() {
        return head;
    }

    if let Some(idx) = description
        .find('.')
        .filter(|&idx| idx > 0 && idx < SENTENCE_SCAN_LIMIT)
    {
        return description[..idx].trim();
    }

    match description.char_indices().nth(FALLBACK_CHARS) {
        Some((cut, _)) => description[..cut].trim(),
        None => description.trim(),
    }
}

fn sanitize(text: &str) -> String {
    let hyphenated = text.split_whitespace().collect::<Vec<_>>().join("-");
    let mut name: String = hyphenated
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_')
        .collect();

    // Only ASCII survives the filter, so byte truncation is safe
    name.truncate(MAX_NAME_LEN);
    let trimmed = name.trim_end_matches('-').len();
    name.truncate(trimmed);
    name
}

/// `base` with a `-N` suffix, shortened so the whole name fits.
fn with_suffix(base: &str, n: usize) -> String {
    let suffix = format!("-{}", n);
    let keep = MAX_NAME_LEN.saturating_sub(suffix.len()).min(base.len());
    format!("{}{}", base[..keep].trim_end_matches('-'), suffix)
}

/// Public-name → upstream-identifier map, owned by the server for the life of
/// the process.
#[derive(Debug, Default)]
pub struct NameRegistry {
    by_name: HashMap<String, String>,
    /// Last assignment per product: (derived base, public name)
    by_product: HashMap<String, (String, String)>,
}

impl NameRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Assign public names to a freshly fetched catalog and record them.
    ///
    /// Returns one name per tool, in catalog order. When two different
    /// upstream tools derive the same name, one of them gets the smallest
    /// free `-2`, `-3`, … suffix so both stay reachable. A product whose
    /// description is unchanged keeps the name it had in the previous listing,
    /// even if the upstream reorders the catalog; otherwise the earlier tool
    /// in catalog order wins the bare name. Names from earlier catalogs are
    /// overwritten when they are reused.
    pub fn register_catalog(&mut self, tools: &[ToolDescriptor]) -> Vec<String> {
        let bases: Vec<String> = tools.iter().map(base_name).collect();
        let mut assigned: HashMap<String, &str> = HashMap::with_capacity(tools.len());
        let mut names: Vec<Option<String>> = vec![None; tools.len()];

        // Products seen before keep their name while it is still free
        for (i, tool) in tools.iter().enumerate() {
            let Some((base, previous)) = self.by_product.get(&tool.name) else {
                continue;
            };
            if *base != bases[i] {
                continue;
            }
            match assigned.get(previous) {
                Some(owner) if *owner != tool.name => {},
                _ => {
                    assigned.insert(previous.clone(), &tool.name);
                    names[i] = Some(previous.clone());
                },
            }
        }

        for (i, tool) in tools.iter().enumerate() {
            if names[i].is_some() {
                continue;
            }
            let base = &bases[i];
            let mut name = base.clone();
            let mut n = 2;
            while let Some(owner) = assigned.get(&name) {
                if *owner == tool.name {
                    break;
                }
                name = with_suffix(base, n);
                n += 1;
            }

            if name != *base {
                tracing::warn!(
                    derived = %base,
                    assigned = %name,
                    product_id = %tool.name,
                    "Tool name collision, using suffixed name"
                );
            }

            assigned.insert(name.clone(), &tool.name);
            names[i] = Some(name);
        }

        let names: Vec<String> = names.into_iter().flatten().collect();
        for ((tool, base), name) in tools.iter().zip(bases).zip(&names) {
            self.by_name.insert(name.clone(), tool.name.clone());
            self.by_product.insert(tool.name.clone(), (base, name.clone()));
        }

        names
    }

    /// Upstream identifier for a public name.
    pub fn resolve(&self, public_name: &str) -> Option<&str> {
        self.by_name.get(public_name).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }
}

fn base_name(tool: &ToolDescriptor) -> String {
    let derived = derive_public_name(&tool.description);
    if !derived.is_empty() {
        return derived;
    }

    let from_id = sanitize(&tool.name);
    if from_id.is_empty() {
        FALLBACK_NAME.to_string()
    } else {
        from_id
    }
}
