//! `Link` response header parsing for API documentation and hub discovery.

pub const API_DOCUMENTATION_REL: &str = "http://www.w3.org/ns/hydra/core#apiDocumentation";
pub const MERCURE_REL: &str = "mercure";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiscoveredLinks {
    pub api_documentation: Option<String>,
    pub mercure_hub: Option<String>,
}

impl DiscoveredLinks {
    pub fn is_empty(&self) -> bool {
        self.api_documentation.is_none() && self.mercure_hub.is_none()
    }
}

/// Parses `<url>; rel="a b", <url2>; rel=c`. The first target per relation wins.
pub fn parse_link_header(header: &str) -> DiscoveredLinks {
    let mut links = DiscoveredLinks::default();

    for entry in split_entries(header) {
        let mut parts = entry.split(';');
        let Some(target) = parts
            .next()
            .map(str::trim)
            .and_then(|t| t.strip_prefix('<'))
            .and_then(|t| t.strip_suffix('>'))
        else {
            continue;
        };

        let rels = parts
            .filter_map(|param| {
                let (name, value) = param.split_once('=')?;
                (name.trim().eq_ignore_ascii_case("rel")).then(|| value.trim().trim_matches('"'))
            })
            .flat_map(str::split_whitespace);

        for rel in rels {
            match rel {
                API_DOCUMENTATION_REL if links.api_documentation.is_none() => {
                    links.api_documentation = Some(target.to_string());
                }
                MERCURE_REL if links.mercure_hub.is_none() => {
                    links.mercure_hub = Some(target.to_string());
                }
                _ => {}
            }
        }
    }

    links
}

/// Splits on commas outside of `<...>`; URLs may legally contain commas.
fn split_entries(header: &str) -> Vec<&str> {
    let mut entries = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (i, c) in header.char_indices() {
        match c {
            '<' => depth += 1,
            '>' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                entries.push(&header[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    entries.push(&header[start..]);
    entries
}
