//! Namespace URIs and in-scope bindings while parsing

use super::strings::StringPool;

/// Well-known namespace URIs
pub mod ns {
    pub const XML: &str = "http://www.w3.org/XML/1998/namespace";
    pub const XMLNS: &str = "http://www.w3.org/2000/xmlns/";
    pub const XSI: &str = "http://www.w3.org/2001/XMLSchema-instance";
    pub const XSD: &str = "http://www.w3.org/2001/XMLSchema";
}

/// Prefix bindings of the open elements, one frame per element.
///
/// Bindings are interned `(prefix, uri)` ids. Prefix 0 is the default
/// namespace and uri 0 undeclares it. `xml` and `xmlns` are fixed and
/// cannot be rebound.
#[derive(Debug)]
pub struct NamespaceScopes {
    frames: Vec<Vec<(u32, u32)>>,
    reserved: [(u32, u32); 2],
}

impl NamespaceScopes {
    pub fn new(strings: &mut StringPool) -> Self {
        let xml = (strings.intern("xml"), strings.intern(ns::XML));
        let xmlns = (strings.intern("xmlns"), strings.intern(ns::XMLNS));
        NamespaceScopes {
            frames: Vec::new(),
            reserved: [xml, xmlns],
        }
    }

    /// Open an element with the declarations on its start tag
    pub fn enter(&mut self, declarations: &[(u32, u32)]) {
        let frame = declarations
            .iter()
            .copied()
            .filter(|(prefix, _)| !self.is_reserved(*prefix))
            .collect();
        self.frames.push(frame);
    }

    /// Close the innermost element
    pub fn leave(&mut self) {
        self.frames.pop();
    }

    pub fn resolve(&self, prefix_id: u32) -> Option<u32> {
        lookup(&self.reserved, prefix_id)
            .or_else(|| self.frames.iter().rev().find_map(|frame| lookup(frame, prefix_id)))
    }

    fn is_reserved(&self, prefix_id: u32) -> bool {
        self.reserved.iter().any(|(prefix, _)| *prefix == prefix_id)
    }
}

fn lookup(frame: &[(u32, u32)], prefix_id: u32) -> Option<u32> {
    frame
        .iter()
        .rev()
        .find(|(prefix, _)| *prefix == prefix_id)
        .map(|&(_, uri)| uri)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> (StringPool, NamespaceScopes) {
        let mut strings = StringPool::new();
        let scopes = NamespaceScopes::new(&mut strings);
        (strings, scopes)
    }

    #[test]
    fn test_reserved_prefixes() {
        let (mut strings, mut scopes) = setup();
        let xml = strings.intern("xml");
        let other = strings.intern("urn:other");
        assert_eq!(scopes.resolve(xml), Some(strings.intern(ns::XML)));
        assert_eq!(scopes.resolve(0), None);

        scopes.enter(&[(xml, other)]);
        assert_eq!(scopes.resolve(xml), Some(strings.intern(ns::XML)));
    }

    #[test]
    fn test_inner_bindings_shadow_and_unwind() {
        let (mut strings, mut scopes) = setup();
        let p = strings.intern("p");
        let outer = strings.intern("urn:outer");
        let inner = strings.intern("urn:inner");

        scopes.enter(&[(p, outer), (0, outer)]);
        scopes.enter(&[(p, inner)]);
        assert_eq!(scopes.resolve(p), Some(inner));
        assert_eq!(scopes.resolve(0), Some(outer));

        scopes.leave();
        assert_eq!(scopes.resolve(p), Some(outer));
        scopes.leave();
        assert_eq!(scopes.resolve(p), None);
    }

    #[test]
    fn test_default_namespace_can_be_undeclared() {
        let (mut strings, mut scopes) = setup();
        let uri = strings.intern("urn:d");
        scopes.enter(&[(0, uri)]);
        scopes.enter(&[(0, 0)]);
        assert_eq!(scopes.resolve(0), Some(0));
    }
}
