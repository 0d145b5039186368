//! Breadcrumb trail for dashboard paths

use serde::Serialize;

use crate::table::capitalize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Crumb {
    pub label: String,
    pub href: String,
    /// The last crumb names the current page and is not a link
    pub is_last: bool,
}

/// One crumb per path segment; top-level paths get none
pub fn breadcrumbs(path: &str) -> Vec<Crumb> {
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    if segments.len() <= 1 {
        return Vec::new();
    }
    segments
        .iter()
        .enumerate()
        .map(|(index, segment)| Crumb {
            label: capitalize(segment),
            href: segments_href(segments[..=index].iter().copied()),
            is_last: index == segments.len() - 1,
        })
        .collect()
}

/// Absolute href from decoded path segments, each percent-encoded
pub fn segments_href<'a>(segments: impl IntoIterator<Item = &'a str>) -> String {
    let Ok(mut url) = reqwest::Url::parse("http://localhost/") else {
        return "/".to_string();
    };
    if let Ok(mut path) = url.path_segments_mut() {
        path.clear().extend(segments);
    }
    url.path().to_string()
}

/// Link to `child` below the absolute path `base`
pub fn child_href(base: &str, child: &str) -> String {
    segments_href(
        base.split('/')
            .filter(|s| !s.is_empty())
            .chain(std::iter::once(child)),
    )
}
