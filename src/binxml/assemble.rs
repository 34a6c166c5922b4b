use chrono::SecondsFormat;
use serde_json::{json, Map, Value};

use crate::binxml::model::{Element, Substitution, TemplateInstance};
use crate::binxml::tree_builder::{node_tree, Node};
use crate::binxml::value_variant::BinXmlValue;
use crate::err::{EvtxError, Result};
use crate::evtx_map::EvtxMap;

/// Expands a template instance into a named map by resolving the positional
/// substitutions of its body against the per-instance value array.
pub fn expand_template(instance: &TemplateInstance) -> Result<EvtxMap> {
    let root = node_tree(&instance.definition.elements);
    let map = node_to_map(instance, &root)?;
    Ok(EvtxMap::from(map))
}

fn node_to_map(instance: &TemplateInstance, node: &Node) -> Result<Map<String, Value>> {
    // The outermost fragment: a nameless node holding a single element.
    if node.start.is_none() && node.children.len() == 1 {
        let child = &node.children[0];
        if let Some(start) = child.start {
            let mut map = Map::new();
            map.insert(
                start.name.as_str().to_string(),
                Value::Object(node_to_map(instance, child)?),
            );
            return Ok(map);
        }
    }

    let mut map = Map::new();

    for (index, child) in node.children.iter().enumerate() {
        let mut child_map = node_to_map(instance, child)?;

        // `<Data Name="X">v</Data>` style nodes collapse into `"X": v`.
        if child_map.len() == 1 && child_map.contains_key("Name") {
            if let Some(name) = child_map["Name"].as_str() {
                map.insert(name.to_string(), json!(""));
                continue;
            }
        }

        if child_map.len() == 2 && child_map.contains_key("Name") && child_map.contains_key("Value")
        {
            if let Some(name) = child_map["Name"].as_str().map(str::to_string) {
                let value = child_map.remove("Value").unwrap_or(Value::Null);
                map.insert(name, value);
                continue;
            }
        }

        let start_name = child
            .start
            .map(|start| start.name.as_str().to_string())
            .unwrap_or_default();

        // Repeated siblings are disambiguated by their positional index.
        let key = if map.contains_key(&start_name) {
            format!("{start_name}{index}")
        } else {
            start_name
        };

        if child_map.len() == 1 && child_map.contains_key("Value") {
            let value = child_map.remove("Value").unwrap_or(Value::Null);
            map.insert(key, value);
        } else {
            map.insert(key, Value::Object(child_map));
        }
    }

    for element in &node.elements {
        match element_to_value(instance, element)? {
            None => {}
            Some(Value::Object(other)) => {
                for (key, value) in other {
                    if map.contains_key(&key) {
                        return Err(EvtxError::ConflictingMergeKey { key });
                    }
                    map.insert(key, value);
                }
            }
            Some(Value::String(text)) => match map.get_mut("Value") {
                Some(Value::String(existing)) => existing.push_str(&text),
                _ => {
                    map.insert("Value".to_string(), Value::String(text));
                }
            },
            Some(value) => {
                map.insert("Value".to_string(), value);
            }
        }
    }

    if let Some(start) = node.start {
        for attribute in &start.attributes {
            match element_to_value(instance, &attribute.data)? {
                None | Some(Value::Null) => {}
                Some(value) => {
                    map.insert(attribute.name.as_str().to_string(), value);
                }
            }
        }
    }

    Ok(map)
}

/// Renders one leaf element. `None` means the element contributes nothing
/// (an optional substitution over a null slot).
fn element_to_value(instance: &TemplateInstance, element: &Element) -> Result<Option<Value>> {
    match element {
        Element::ValueText(text) => Ok(Some(json!(text))),
        Element::NormalSubstitution(substitution) => {
            let value = lookup_substitution(instance, substitution)?;
            Ok(Some(render_value(value)?))
        }
        Element::OptionalSubstitution(substitution) => {
            let value = lookup_substitution(instance, substitution)?;
            if value.is_null() {
                Ok(None)
            } else {
                Ok(Some(render_value(value)?))
            }
        }
        Element::Fragment(fragment) => element_to_value(instance, &fragment.element),
        Element::TemplateInstance(nested) => {
            Ok(Some(Value::Object(expand_template(nested)?.into_inner())))
        }
        Element::EntityRef(name) => match name.as_str() {
            "amp" => Ok(Some(json!("&"))),
            "lt" => Ok(Some(json!("<"))),
            "gt" => Ok(Some(json!(">"))),
            "quot" => Ok(Some(json!("\""))),
            "apos" => Ok(Some(json!("'"))),
            unknown => Err(EvtxError::UnknownEntityReference {
                name: unknown.to_string(),
            }),
        },
        Element::CharRef(value) => {
            let rendered = char::from_u32(u32::from(*value))
                .map(String::from)
                .unwrap_or_else(|| format!("&#{value};"));
            Ok(Some(json!(rendered)))
        }
        _ => Err(EvtxError::FailedToCreateRecordModel {
            message: "unexpected element kind during expansion",
        }),
    }
}

fn lookup_substitution<'a>(
    instance: &'a TemplateInstance,
    substitution: &Substitution,
) -> Result<&'a BinXmlValue> {
    usize::try_from(substitution.substitution_index)
        .ok()
        .and_then(|index| instance.values.get(index))
        .ok_or(EvtxError::OutOfRangeSubstitution {
            index: substitution.substitution_index,
            num_values: instance.values.len(),
        })
}

/// Canonical rendering of a decoded value: numbers stay numbers, timestamps
/// become RFC3339 UTC strings, binary becomes a padded hex string.
fn render_value(value: &BinXmlValue) -> Result<Value> {
    let rendered = match value {
        BinXmlValue::Null => Value::Null,
        BinXmlValue::String(s) | BinXmlValue::AnsiString(s) => json!(s),
        BinXmlValue::Int8(n) => json!(n),
        BinXmlValue::UInt8(n) => json!(n),
        BinXmlValue::Int16(n) => json!(n),
        BinXmlValue::UInt16(n) => json!(n),
        BinXmlValue::Int32(n) => json!(n),
        BinXmlValue::UInt32(n) => json!(n),
        BinXmlValue::Int64(n) => json!(n),
        BinXmlValue::UInt64(n) => json!(n),
        BinXmlValue::Real64(n) => json!(n),
        BinXmlValue::Bool(b) => json!(b),
        BinXmlValue::Binary(bytes) => {
            let repr: String = bytes.iter().map(|b| format!("{b:02X}")).collect();
            json!(repr)
        }
        BinXmlValue::Guid(guid) => json!(guid.to_string()),
        BinXmlValue::FileTime(t) | BinXmlValue::SysTime(t) => {
            json!(t.to_rfc3339_opts(SecondsFormat::AutoSi, true))
        }
        BinXmlValue::Sid(sid) => json!(sid.to_string()),
        BinXmlValue::HexInt32(s) | BinXmlValue::HexInt64(s) => json!(s),
        BinXmlValue::BinXml(element) => {
            return embedded_to_value(element);
        }
        BinXmlValue::StringArray(strings) => json!(strings),
        BinXmlValue::UInt16Array(numbers) => json!(numbers),
        BinXmlValue::UInt64Array(numbers) => json!(numbers),
        BinXmlValue::Unknown { .. } => Value::Null,
    };

    Ok(rendered)
}

/// An embedded binxml slot holds its own fragment / template instance and is
/// expanded as a child map rather than as a scalar.
fn embedded_to_value(element: &Element) -> Result<Value> {
    match element {
        Element::Fragment(fragment) => embedded_to_value(&fragment.element),
        Element::TemplateInstance(instance) => {
            Ok(Value::Object(expand_template(instance)?.into_inner()))
        }
        _ => Err(EvtxError::FailedToCreateRecordModel {
            message: "embedded binxml does not hold a template instance",
        }),
    }
}
