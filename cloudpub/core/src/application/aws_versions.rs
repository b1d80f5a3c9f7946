// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! AWS Versions
//!
//! Groups product versions by major and minor release to decide which
//! delivery options to restrict.
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Implements aws_versions

use crate::domain::aws::GroupedVersions;
use chrono::{DateTime, FixedOffset};
use regex::Regex;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::OnceLock;

/// major -> minor -> public versions of that minor release
pub type VersionTree = BTreeMap<u64, BTreeMap<u64, Vec<GroupedVersions>>>;

pub const PUBLIC_VISIBILITY: &str = "Public";

/// Delivery options and AMIs selected for restriction
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RestrictedVersions {
    pub delivery_option_ids: Vec<String>,
    pub ami_ids: Vec<String>,
}

impl RestrictedVersions {
    pub fn is_empty(&self) -> bool {
        self.delivery_option_ids.is_empty()
    }

    pub fn extend(&mut self, other: RestrictedVersions) {
        self.delivery_option_ids.extend(other.delivery_option_ids);
        self.ami_ids.extend(other.ami_ids);
    }

    fn push(&mut self, version: &GroupedVersions) {
        if let Some(option) = version.delivery_options.first() {
            self.delivery_option_ids.push(option.id.clone());
            self.ami_ids.extend(version.ami_ids.iter().cloned());
        }
    }
}

/// Release versions with optional epoch, pre, post, dev and local segments
fn version_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(concat!(
            r"(?i)^v?(?:\d+!)?(\d+)(?:\.(\d+))?(?:\.\d+)*",
            r"(?:[-_.]?(?:alpha|a|beta|b|preview|pre|c|rc)[-_.]?\d*)?",
            r"(?:-\d+|[-_.]?(?:post|rev|r)[-_.]?\d*)?",
            r"(?:[-_.]?dev[-_.]?\d*)?",
            r"(?:\+[a-z0-9]+(?:[-_.][a-z0-9]+)*)?$",
        ))
        .expect("invalid version pattern")
    })
}

/// Major and minor release parsed from the first word of a version title
pub fn parse_release(title: &str) -> Option<(u64, u64)> {
    let token = title.split(' ').next()?;
    let caps = version_regex().captures(token)?;
    let major = caps.get(1)?.as_str().parse().ok()?;
    let minor = match caps.get(2) {
        Some(m) => m.as_str().parse().ok()?,
        None => 0,
    };
    Some((major, minor))
}

/// Order creation dates, newest last. Unparseable dates sort as plain strings.
pub fn compare_created(a: &str, b: &str) -> Ordering {
    let parse = |s: &str| DateTime::<FixedOffset>::parse_from_rfc3339(s).ok();
    match (parse(a), parse(b)) {
        (Some(x), Some(y)) => x.cmp(&y),
        _ => a.cmp(b),
    }
}

/// Build the release tree.
///
/// Titles that don't start with a version number are skipped. Only versions
/// whose first delivery option is public are kept, but their release buckets
/// are created anyway.
pub fn create_version_tree(versions: &[GroupedVersions]) -> VersionTree {
    let mut tree = VersionTree::new();
    for version in versions {
        let Some((major, minor)) = parse_release(&version.title) else {
            continue;
        };
        let bucket = tree.entry(major).or_default().entry(minor).or_default();
        let public = version
            .delivery_options
            .first()
            .is_some_and(|d| d.visibility == PUBLIC_VISIBILITY);
        if public {
            bucket.push(version.clone());
        }
    }
    tree
}

/// Restrict every major release but the newest `keep` ones, removing them from the tree
pub fn get_restricted_major_versions(tree: &mut VersionTree, keep: usize) -> RestrictedVersions {
    let mut restricted = RestrictedVersions::default();
    let old: Vec<u64> = tree.keys().rev().skip(keep).copied().collect();
    for major in old {
        if let Some(minors) = tree.remove(&major) {
            minors.values().flatten().for_each(|v| restricted.push(v));
        }
    }
    restricted
}

/// Restrict every minor release but the newest `keep` ones of each major release
pub fn get_restricted_minor_versions(tree: &mut VersionTree, keep: usize) -> RestrictedVersions {
    let mut restricted = RestrictedVersions::default();
    for minors in tree.values_mut() {
        let old: Vec<u64> = minors.keys().rev().skip(keep).copied().collect();
        for minor in old {
            if let Some(versions) = minors.remove(&minor) {
                versions.iter().for_each(|v| restricted.push(v));
            }
        }
    }
    restricted
}

/// Restrict all but the newest version (by creation date) of each minor release
pub fn get_restricted_patch_versions(tree: &VersionTree) -> RestrictedVersions {
    let mut restricted = RestrictedVersions::default();
    for versions in tree.values().flat_map(BTreeMap::values) {
        let mut ordered: Vec<&GroupedVersions> = versions.iter().collect();
        ordered.sort_by(|a, b| compare_created(&b.created_date, &a.created_date));
        ordered.iter().skip(1).for_each(|v| restricted.push(v));
    }
    restricted
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aws::ProductDeliveryOption;

    fn version(title: &str, id: &str, visibility: &str, created: &str, ami: &str) -> GroupedVersions {
        GroupedVersions {
            title: title.to_string(),
            delivery_options: vec![ProductDeliveryOption {
                id: id.to_string(),
                option_type: None,
                visibility: visibility.to_string(),
                title: None,
                source_id: None,
                extra: Default::default(),
            }],
            created_date: created.to_string(),
            ami_ids: vec![ami.to_string()],
        }
    }

    fn versions() -> Vec<GroupedVersions> {
        vec![
            version("8.6 20220101", "id-8-6", "Public", "2022-01-01T00:00:00.000Z", "ami-8-6"),
            version("9.0 20220513", "id-9-0-a", "Public", "2022-05-13T00:00:00.000Z", "ami-9-0-a"),
            version("9.0 20220613", "id-9-0-b", "Public", "2022-06-13T00:00:00.000Z", "ami-9-0-b"),
            version("9.0 20220713", "id-9-0-c", "Restricted", "2022-07-13T00:00:00.000Z", "ami-9-0-c"),
            version("9.1 20220913", "id-9-1", "Public", "2022-09-13T00:00:00.000Z", "ami-9-1"),
            version("v9.2", "id-9-2", "Limited", "2022-10-13T00:00:00.000Z", "ami-9-2"),
            version("BadVersion", "id-bad", "Public", "2022-01-24T12:41:25.503Z", "ami-bad"),
        ]
    }

    #[test]
    fn test_parse_release() {
        assert_eq!(parse_release("9.0 20220513-0"), Some((9, 0)));
        assert_eq!(parse_release("v10.2.1"), Some((10, 2)));
        assert_eq!(parse_release("8 beta"), Some((8, 0)));
        assert_eq!(parse_release("OpenShift Container Platform 9.0"), None);
        assert_eq!(parse_release("BadVersion"), None);
    }

    #[test]
    fn test_parse_release_suffixes() {
        assert_eq!(parse_release("9.0rc1"), Some((9, 0)));
        assert_eq!(parse_release("9.0-beta.2 20240101"), Some((9, 0)));
        assert_eq!(parse_release("9.0.post1"), Some((9, 0)));
        assert_eq!(parse_release("9.0.1-1"), Some((9, 0)));
        assert_eq!(parse_release("9.0.dev0"), Some((9, 0)));
        assert_eq!(parse_release("9.0+local.1"), Some((9, 0)));
        assert_eq!(parse_release("1!9.4"), Some((9, 4)));
        assert_eq!(parse_release("V9.4"), Some((9, 4)));
        assert_eq!(parse_release("9.0-"), None);
        assert_eq!(parse_release("9.0~rc1"), None);
    }

    #[test]
    fn test_create_version_tree() {
        let tree = create_version_tree(&versions());

        assert_eq!(tree.keys().copied().collect::<Vec<_>>(), vec![8, 9]);
        assert_eq!(tree[&9].keys().copied().collect::<Vec<_>>(), vec![0, 1, 2]);
        assert_eq!(tree[&9][&0].len(), 2);
        assert!(tree[&9][&2].is_empty());
    }

    #[test]
    fn test_restrict_major_versions() {
        let mut tree = create_version_tree(&versions());
        let restricted = get_restricted_major_versions(&mut tree, 1);

        assert_eq!(restricted.delivery_option_ids, vec!["id-8-6"]);
        assert_eq!(restricted.ami_ids, vec!["ami-8-6"]);
        assert!(!tree.contains_key(&8));
    }

    #[test]
    fn test_restrict_minor_versions() {
        let mut tree = create_version_tree(&versions());
        let restricted = get_restricted_minor_versions(&mut tree, 2);

        assert_eq!(restricted.delivery_option_ids, vec!["id-9-0-a", "id-9-0-b"]);
        assert_eq!(tree[&9].keys().copied().collect::<Vec<_>>(), vec![1, 2]);
        assert!(tree[&8].contains_key(&6));
    }

    #[test]
    fn test_restrict_patch_versions_keeps_newest() {
        let tree = create_version_tree(&versions());
        let restricted = get_restricted_patch_versions(&tree);

        assert_eq!(restricted.delivery_option_ids, vec!["id-9-0-a"]);
        assert_eq!(restricted.ami_ids, vec!["ami-9-0-a"]);
    }

    #[test]
    fn test_compare_created() {
        assert_eq!(
            compare_created("2022-01-24T12:41:25.503Z", "2022-01-24T13:41:25+02:00"),
            Ordering::Greater
        );
        assert_eq!(compare_created("a", "b"), Ordering::Less);
    }
}
