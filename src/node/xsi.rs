//! `xsi:type` and `xsi:nil` attributes

use crate::dom::{ns, split_qname, NodeId, NodeKind, XmlDocument};
use crate::types::XmlName;

const TYPE: &str = "type";
const NIL: &str = "nil";

/// Resolve an element's `xsi:type` QName against its in-scope prefixes
pub(crate) fn read_type(doc: &XmlDocument, id: NodeId) -> Option<XmlName> {
    if doc.kind(id) != Some(NodeKind::Element) {
        return None;
    }
    let qname = doc.get_attribute(id, TYPE, ns::XSI)?.trim();
    let (prefix, local) = split_qname(qname);
    let namespace = doc.lookup_namespace(id, prefix).unwrap_or("");
    Some(XmlName::new(local, namespace))
}

/// Set or remove an element's `xsi:type`, declaring prefixes as needed
pub(crate) fn write_type(doc: &mut XmlDocument, id: NodeId, xsi_type: Option<&XmlName>) {
    let Some(name) = xsi_type else {
        doc.remove_attribute(id, TYPE, ns::XSI);
        return;
    };
    doc.ensure_prefix(id, ns::XSI, Some("xsi"));
    let namespace = name.effective_namespace("");
    let qname = if namespace.is_empty() {
        name.local.clone()
    } else {
        format!("{}:{}", doc.ensure_prefix(id, namespace, None), name.local)
    };
    doc.set_attribute(id, TYPE, ns::XSI, &qname);
}

pub(crate) fn read_nil(doc: &XmlDocument, id: NodeId) -> bool {
    matches!(
        doc.get_attribute(id, NIL, ns::XSI).map(str::trim),
        Some("true") | Some("1")
    )
}

/// Mark an element nil (dropping its content) or clear the mark
pub(crate) fn write_nil(doc: &mut XmlDocument, id: NodeId, nil: bool) {
    if nil {
        doc.clear_children(id);
        doc.ensure_prefix(id, ns::XSI, Some("xsi"));
        doc.set_attribute(id, NIL, ns::XSI, "true");
    } else {
        doc.remove_attribute(id, NIL, ns::XSI);
    }
}
