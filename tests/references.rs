use std::sync::{Arc, Once};

use pretty_assertions::assert_eq;
use rstest::rstest;

use xmlbind::{
    serializer, Backend, CustomSerializer, DataType, Document, Error, Node, Object, ReferenceFormat,
    ReferenceManager, Value, XPathValue, XmlAccessor, XmlName,
};

struct Person {
    name: String,
}

fn person_type() -> DataType {
    DataType::reference("Person")
}

/// Persons are written as `<Name>` children
fn register_person() {
    static REGISTER: Once = Once::new();
    REGISTER.call_once(|| {
        let _ = env_logger::builder().is_test(true).try_init();
        serializer::register(
            person_type(),
            Arc::new(CustomSerializer::new(
                |node: &Node| {
                    let name = match node.evaluate("string(Name)")? {
                        Some(XPathValue::String(name)) => name,
                        _ => String::new(),
                    };
                    Ok(Value::Object(Object::new(Person { name }, person_type())))
                },
                |node: &Node, value: &Value| {
                    let person = value
                        .as_object()
                        .and_then(|o| o.downcast_ref::<Person>())
                        .ok_or_else(|| Error::serialization("not a person"))?;
                    let mut writer = node.write_children();
                    writer.write_text_element("Name", &person.name)?;
                    writer.finish().map(drop)
                },
            )),
        );
    });
}

fn person(name: &str) -> Value {
    Value::Object(Object::new(
        Person {
            name: name.to_string(),
        },
        person_type(),
    ))
}

fn name_of(value: &Value) -> &str {
    value
        .as_object()
        .and_then(|o| o.downcast_ref::<Person>())
        .map(|p| p.name.as_str())
        .unwrap_or_default()
}

fn slot(name: &str) -> XmlAccessor {
    XmlAccessor::element(XmlName::local(name), person_type()).reference(true)
}

fn same(a: &Value, b: &Value) -> bool {
    matches!((a, b), (Value::Object(a), Value::Object(b)) if a.ptr_eq(b))
}

fn setup(xml: &str, backend: Backend) -> (Document, Node, ReferenceManager) {
    register_person();
    let doc = Document::parse(xml).unwrap();
    let root = doc.root_element(backend).unwrap();
    let refs = ReferenceManager::new(&root, ReferenceFormat::default());
    (doc, root, refs)
}

fn normalized(xml: &str) -> String {
    Document::parse(xml).unwrap().to_xml()
}

#[rstest]
#[case(Backend::Tree)]
#[case(Backend::Navigator)]
fn repeated_reads_return_the_same_value(#[case] backend: Backend) {
    let (_doc, root, mut refs) = setup("<Root><A><Name>Ann</Name></A></Root>", backend);
    let first = slot("A").get(&root, &mut refs).unwrap().unwrap();
    let second = slot("A").get(&root, &mut refs).unwrap().unwrap();
    assert_eq!(name_of(&first), "Ann");
    assert!(same(&first, &second));
}

#[rstest]
#[case(Backend::Tree)]
#[case(Backend::Navigator)]
fn shared_value_is_written_once(#[case] backend: Backend) {
    let (doc, root, mut refs) = setup("<Root/>", backend);
    let ann = person("Ann");
    slot("A").set(&root, &mut refs, None, Some(&ann)).unwrap();
    slot("B").set(&root, &mut refs, None, Some(&ann)).unwrap();

    assert_eq!(
        doc.to_xml(),
        normalized(
            "<Root xmlns:x='urn:xmlbind:reference'>\
             <A x:id='1'><Name>Ann</Name></A><B x:ref='1'/></Root>"
        )
    );

    let a = slot("A").get(&root, &mut refs).unwrap().unwrap();
    let b = slot("B").get(&root, &mut refs).unwrap().unwrap();
    assert!(same(&a, &ann));
    assert!(same(&b, &ann));
}

#[rstest]
#[case(Backend::Tree)]
#[case(Backend::Navigator)]
fn persisted_references_resolve_to_one_value(#[case] backend: Backend) {
    let xml = "<Root xmlns:x='urn:xmlbind:reference'>\
               <B x:ref='4'/><A x:id='4'><Name>Ann</Name></A></Root>";
    let (_doc, root, mut refs) = setup(xml, backend);

    let b = slot("B").get(&root, &mut refs).unwrap().unwrap();
    let a = slot("A").get(&root, &mut refs).unwrap().unwrap();
    assert_eq!(name_of(&b), "Ann");
    assert!(same(&a, &b));
}

#[rstest]
#[case(Backend::Tree)]
#[case(Backend::Navigator)]
fn reassigning_a_primary_moves_its_content(#[case] backend: Backend) {
    let (doc, root, mut refs) = setup("<Root/>", backend);
    let ann = person("Ann");
    let bob = person("Bob");
    slot("A").set(&root, &mut refs, None, Some(&ann)).unwrap();
    slot("B").set(&root, &mut refs, None, Some(&ann)).unwrap();
    slot("A").set(&root, &mut refs, Some(&ann), Some(&bob)).unwrap();

    assert_eq!(
        doc.to_xml(),
        normalized(
            "<Root xmlns:x='urn:xmlbind:reference'>\
             <A><Name>Bob</Name></A><B><Name>Ann</Name></B></Root>"
        )
    );
    assert!(refs.try_get(&ann).unwrap().position_eq(&slot_node(&root, "B")));
    assert!(refs.try_get(&bob).unwrap().position_eq(&slot_node(&root, "A")));

    let b = slot("B").get(&root, &mut refs).unwrap().unwrap();
    assert!(same(&b, &ann));
}

#[test]
fn clearing_a_reference_leaves_the_primary() {
    let (doc, root, mut refs) = setup("<Root/>", Backend::Tree);
    let ann = person("Ann");
    slot("A").set(&root, &mut refs, None, Some(&ann)).unwrap();
    slot("B").set(&root, &mut refs, None, Some(&ann)).unwrap();
    slot("B").set(&root, &mut refs, Some(&ann), None).unwrap();

    assert_eq!(
        doc.to_xml(),
        normalized("<Root xmlns:x='urn:xmlbind:reference'><A><Name>Ann</Name></A></Root>")
    );
}

#[test]
fn shared_items_in_a_collection() {
    let (doc, root, mut refs) = setup("<Root/>", Backend::Tree);
    let ann = person("Ann");
    let bob = person("Bob");
    let members = slot("Member");
    members
        .set_items(&root, &mut refs, &[], &[ann.clone(), bob.clone(), ann.clone()])
        .unwrap();
    assert_eq!(
        doc.to_xml(),
        normalized(
            "<Root xmlns:x='urn:xmlbind:reference'>\
             <Member x:id='1'><Name>Ann</Name></Member>\
             <Member><Name>Bob</Name></Member>\
             <Member x:ref='1'/></Root>"
        )
    );

    let items = members.get_items(&root, &mut refs).unwrap();
    assert_eq!(items.len(), 3);
    assert!(same(&items[0], &ann));
    assert!(same(&items[2], &ann));
    assert_eq!(name_of(&items[1]), "Bob");

    members.set_items(&root, &mut refs, &items, &[bob.clone()]).unwrap();
    assert_eq!(
        doc.to_xml(),
        normalized("<Root xmlns:x='urn:xmlbind:reference'><Member><Name>Bob</Name></Member></Root>")
    );
}

fn slot_node(root: &Node, name: &str) -> Node {
    root.select_subtree()
        .into_iter()
        .find(|n| n.local_name() == name)
        .unwrap()
}
