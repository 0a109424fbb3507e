use std::collections::BTreeMap;

use http::Uri;
use serde::ser::{Serialize, SerializeMap, Serializer};

/// Parts of a requested URL that can be attached to a decoded log line.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum UrlComponent {
    Pathname,
    Host,
    Protocol,
    Port,
    Hostname,
    Path,
    Search,
    Href,
    Hash,
}

impl UrlComponent {
    /// Key used for this component in serialized records.
    pub fn field(self) -> &'static str {
        match self {
            UrlComponent::Pathname => "requested_resource.pathname",
            UrlComponent::Host => "requested_resource.host",
            UrlComponent::Protocol => "requested_resource.protocol",
            UrlComponent::Port => "requested_resource.port",
            UrlComponent::Hostname => "requested_resource.hostname",
            UrlComponent::Path => "requested_resource.path",
            UrlComponent::Search => "requested_resource.search",
            UrlComponent::Href => "requested_resource.href",
            UrlComponent::Hash => "requested_resource.hash",
        }
    }
}

/// Sparse decomposition of a requested URL. Only non-empty components are
/// stored.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RequestedResource {
    components: BTreeMap<UrlComponent, String>,
}

impl RequestedResource {
    pub fn get(&self, component: UrlComponent) -> Option<&str> {
        self.components.get(&component).map(String::as_str)
    }

    pub fn contains(&self, component: UrlComponent) -> bool {
        self.components.contains_key(&component)
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (UrlComponent, &str)> {
        self.components.iter().map(|(&c, v)| (c, v.as_str()))
    }

    fn set(&mut self, component: UrlComponent, value: impl Into<String>) {
        let value = value.into();
        if !value.is_empty() {
            self.components.insert(component, value);
        }
    }

    /// Decomposes the target of an HTTP request line.
    ///
    /// Absolute (`scheme://authority/...`) and origin-form (`/path?query`)
    /// targets are parsed as URIs. Any other target, such as the `-` that
    /// ELB writes for malformed requests, is kept as an opaque path. Targets
    /// that are not valid URIs decompose to nothing.
    pub fn parse(target: &str) -> Self {
        let mut resource = Self::default();
        if target.is_empty() {
            return resource;
        }

        let (rest, fragment) = match target.split_once('#') {
            Some((rest, fragment)) => (rest, Some(fragment)),
            None => (target, None),
        };
        let hash = match fragment {
            Some(f) if !f.is_empty() => format!("#{f}"),
            _ => String::new(),
        };

        if !rest.contains("://") && !rest.starts_with('/') {
            resource.set(UrlComponent::Pathname, rest);
            resource.set(UrlComponent::Path, rest);
            resource.set(UrlComponent::Href, format!("{rest}{hash}"));
            resource.set(UrlComponent::Hash, hash);
            return resource;
        }

        let Ok(uri) = rest.parse::<Uri>() else {
            return resource;
        };

        let pathname = uri.path();
        let search = match uri.query() {
            Some(q) if !q.is_empty() => format!("?{q}"),
            _ => String::new(),
        };
        let path = format!("{pathname}{search}");

        let href = match (uri.scheme_str(), uri.authority()) {
            (Some(scheme), Some(authority)) => {
                let protocol = format!("{}:", scheme.to_ascii_lowercase());
                let bracketed = authority.host().to_ascii_lowercase();
                let hostname = bracketed.trim_start_matches('[').trim_end_matches(']');
                let host = match authority.port() {
                    Some(port) => format!("{bracketed}:{}", port.as_str()),
                    None => bracketed.clone(),
                };
                let userinfo = match authority.as_str().rsplit_once('@') {
                    Some((userinfo, _)) => format!("{userinfo}@"),
                    None => String::new(),
                };

                let href = format!("{protocol}//{userinfo}{host}{path}{hash}");
                resource.set(UrlComponent::Protocol, protocol);
                resource.set(UrlComponent::Hostname, hostname);
                if let Some(port) = authority.port() {
                    resource.set(UrlComponent::Port, port.as_str());
                }
                resource.set(UrlComponent::Host, host);
                href
            }
            _ => format!("{path}{hash}"),
        };

        resource.set(UrlComponent::Pathname, pathname);
        resource.set(UrlComponent::Search, search);
        resource.set(UrlComponent::Path, path);
        resource.set(UrlComponent::Hash, hash);
        resource.set(UrlComponent::Href, href);
        resource
    }
}

impl Serialize for RequestedResource {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(Some(self.components.len()))?;
        for (component, value) in &self.components {
            map.serialize_entry(component.field(), value)?;
        }
        map.end()
    }
}

#[test]
fn test_absolute_url() {
    let r = RequestedResource::parse("https://example.com:443/a/b?x=1");
    assert_eq!(r.get(UrlComponent::Pathname), Some("/a/b"));
    assert_eq!(r.get(UrlComponent::Host), Some("example.com:443"));
    assert_eq!(r.get(UrlComponent::Hostname), Some("example.com"));
    assert_eq!(r.get(UrlComponent::Port), Some("443"));
    assert_eq!(r.get(UrlComponent::Protocol), Some("https:"));
    assert_eq!(r.get(UrlComponent::Search), Some("?x=1"));
    assert_eq!(r.get(UrlComponent::Path), Some("/a/b?x=1"));
    assert_eq!(r.get(UrlComponent::Href), Some("https://example.com:443/a/b?x=1"));
    assert!(!r.contains(UrlComponent::Hash));
    assert_eq!(r.len(), 8);
}

#[test]
fn test_url_without_port_or_path() {
    let r = RequestedResource::parse("HTTP://Example.COM");
    assert_eq!(r.get(UrlComponent::Protocol), Some("http:"));
    assert_eq!(r.get(UrlComponent::Host), Some("example.com"));
    assert_eq!(r.get(UrlComponent::Pathname), Some("/"));
    assert_eq!(r.get(UrlComponent::Href), Some("http://example.com/"));
    assert!(!r.contains(UrlComponent::Port));
    assert!(!r.contains(UrlComponent::Search));
}

#[test]
fn test_origin_form_with_fragment() {
    let r = RequestedResource::parse("/settings/avatar?uid=1#top");
    assert_eq!(r.get(UrlComponent::Pathname), Some("/settings/avatar"));
    assert_eq!(r.get(UrlComponent::Search), Some("?uid=1"));
    assert_eq!(r.get(UrlComponent::Hash), Some("#top"));
    assert_eq!(r.get(UrlComponent::Href), Some("/settings/avatar?uid=1#top"));
    assert!(!r.contains(UrlComponent::Host));
    assert!(!r.contains(UrlComponent::Protocol));
}

#[test]
fn test_opaque_and_empty_targets() {
    let r = RequestedResource::parse("-");
    assert_eq!(r.get(UrlComponent::Path), Some("-"));
    assert_eq!(r.len(), 3);

    assert!(RequestedResource::parse("").is_empty());
    assert!(RequestedResource::parse("https://exa mple.com/").is_empty());
}

#[test]
fn test_serialized_keys() {
    let r = RequestedResource::parse("/a?b");
    assert_eq!(
        serde_json::to_string(&r).unwrap(),
        r#"{"requested_resource.pathname":"/a","requested_resource.path":"/a?b","requested_resource.search":"?b","requested_resource.href":"/a?b"}"#
    );
}
