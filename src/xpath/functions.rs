//! XPath 1.0 Functions
//!
//! Node set: position(), last(), count(), local-name(), namespace-uri(), name()
//!
//! String: string(), concat(), starts-with(), contains(), substring(),
//! substring-before(), substring-after(), string-length(),
//! normalize-space(), translate()
//!
//! Boolean: boolean(), not(), true(), false(), lang()
//!
//! Number: number(), sum(), floor(), ceiling(), round()

use super::value::{parse_number, XPathValue};
use crate::dom::{ns, NodeId, XmlDocument};
use crate::error::{Error, Result};

/// Where a function is being evaluated
pub struct CallSite<'a> {
    pub doc: &'a XmlDocument,
    pub context: NodeId,
    pub position: usize,
    pub size: usize,
}

/// Evaluate a function call
pub fn call(name: &str, args: Vec<XPathValue>, site: &CallSite<'_>) -> Result<XPathValue> {
    let doc = site.doc;
    let value = match name {
        "position" => {
            arity(name, &args, 0, 0)?;
            XPathValue::Number(site.position as f64)
        }
        "last" => {
            arity(name, &args, 0, 0)?;
            XPathValue::Number(site.size as f64)
        }
        "count" => {
            arity(name, &args, 1, 1)?;
            XPathValue::Number(node_set(name, &args[0])?.len() as f64)
        }
        "local-name" | "namespace-uri" | "name" => {
            arity(name, &args, 0, 1)?;
            let node = match args.first() {
                None => Some(site.context),
                Some(arg) => node_set(name, arg)?.first().copied(),
            };
            let text = match (name, node) {
                (_, None) => String::new(),
                ("local-name", Some(n)) => doc.local_name(n).to_string(),
                ("namespace-uri", Some(n)) => doc.namespace_uri(n).to_string(),
                (_, Some(n)) => doc.qualified_name(n),
            };
            XPathValue::String(text)
        }

        "string" => {
            arity(name, &args, 0, 1)?;
            XPathValue::String(string_arg(site, args.first()))
        }
        "concat" => {
            arity(name, &args, 2, usize::MAX)?;
            XPathValue::String(args.iter().map(|a| a.string(doc)).collect())
        }
        "starts-with" => {
            arity(name, &args, 2, 2)?;
            XPathValue::Boolean(args[0].string(doc).starts_with(&args[1].string(doc)))
        }
        "contains" => {
            arity(name, &args, 2, 2)?;
            XPathValue::Boolean(args[0].string(doc).contains(&args[1].string(doc)))
        }
        "substring" => {
            arity(name, &args, 2, 3)?;
            XPathValue::String(substring(
                &args[0].string(doc),
                args[1].number(doc),
                args.get(2).map(|a| a.number(doc)),
            ))
        }
        "substring-before" => {
            arity(name, &args, 2, 2)?;
            let s = args[0].string(doc);
            let pattern = args[1].string(doc);
            XPathValue::String(s.find(&pattern).map(|pos| s[..pos].to_string()).unwrap_or_default())
        }
        "substring-after" => {
            arity(name, &args, 2, 2)?;
            let s = args[0].string(doc);
            let pattern = args[1].string(doc);
            XPathValue::String(
                s.find(&pattern)
                    .map(|pos| s[pos + pattern.len()..].to_string())
                    .unwrap_or_default(),
            )
        }
        "string-length" => {
            arity(name, &args, 0, 1)?;
            XPathValue::Number(string_arg(site, args.first()).chars().count() as f64)
        }
        "normalize-space" => {
            arity(name, &args, 0, 1)?;
            let s = string_arg(site, args.first());
            XPathValue::String(s.split_whitespace().collect::<Vec<_>>().join(" "))
        }
        "translate" => {
            arity(name, &args, 3, 3)?;
            let from: Vec<char> = args[1].string(doc).chars().collect();
            let to: Vec<char> = args[2].string(doc).chars().collect();
            let translated = args[0]
                .string(doc)
                .chars()
                .filter_map(|c| match from.iter().position(|&f| f == c) {
                    Some(pos) => to.get(pos).copied(),
                    None => Some(c),
                })
                .collect();
            XPathValue::String(translated)
        }

        "boolean" => {
            arity(name, &args, 1, 1)?;
            XPathValue::Boolean(args[0].to_boolean())
        }
        "not" => {
            arity(name, &args, 1, 1)?;
            XPathValue::Boolean(!args[0].to_boolean())
        }
        "true" => XPathValue::Boolean(true),
        "false" => XPathValue::Boolean(false),
        "lang" => {
            arity(name, &args, 1, 1)?;
            XPathValue::Boolean(lang(doc, site.context, &args[0].string(doc)))
        }

        "number" => {
            arity(name, &args, 0, 1)?;
            let n = match args.first() {
                Some(arg) => arg.number(doc),
                None => parse_number(&doc.string_value(site.context)),
            };
            XPathValue::Number(n)
        }
        "sum" => {
            arity(name, &args, 1, 1)?;
            let total = node_set(name, &args[0])?
                .iter()
                .map(|&n| parse_number(&doc.string_value(n)))
                .sum();
            XPathValue::Number(total)
        }
        "floor" => {
            arity(name, &args, 1, 1)?;
            XPathValue::Number(args[0].number(doc).floor())
        }
        "ceiling" => {
            arity(name, &args, 1, 1)?;
            XPathValue::Number(args[0].number(doc).ceil())
        }
        "round" => {
            arity(name, &args, 1, 1)?;
            // XPath rounds .5 towards positive infinity
            XPathValue::Number((args[0].number(doc) + 0.5).floor())
        }

        _ => return Err(Error::evaluation(format!("unknown function: {}()", name))),
    };
    Ok(value)
}

fn arity(name: &str, args: &[XPathValue], min: usize, max: usize) -> Result<()> {
    if args.len() < min || args.len() > max {
        return Err(Error::evaluation(format!(
            "{}() called with {} argument(s)",
            name,
            args.len()
        )));
    }
    Ok(())
}

fn node_set<'v>(name: &str, arg: &'v XPathValue) -> Result<&'v Vec<NodeId>> {
    arg.as_nodeset()
        .ok_or_else(|| Error::evaluation(format!("{}() argument must be a node-set", name)))
}

fn string_arg(site: &CallSite<'_>, arg: Option<&XPathValue>) -> String {
    match arg {
        Some(value) => value.string(site.doc),
        None => site.doc.string_value(site.context),
    }
}

fn substring(s: &str, start: f64, length: Option<f64>) -> String {
    let first = (start + 0.5).floor();
    let last = match length {
        Some(len) => first + (len + 0.5).floor(),
        None => f64::INFINITY,
    };
    s.chars()
        .enumerate()
        .filter(|&(i, _)| {
            let pos = (i + 1) as f64;
            pos >= first && pos < last
        })
        .map(|(_, c)| c)
        .collect()
}

fn lang(doc: &XmlDocument, context: NodeId, target: &str) -> bool {
    let target = target.to_lowercase();
    let mut node = Some(context);
    while let Some(n) = node {
        if let Some(value) = doc.get_attribute(n, "lang", ns::XML) {
            let value = value.to_lowercase();
            return value == target
                || (value.starts_with(&target) && value.as_bytes().get(target.len()) == Some(&b'-'));
        }
        node = doc.parent_of(n);
    }
    false
}
