use std::rc::Rc;

use crate::binxml::name::BinXmlName;
use crate::binxml::value_variant::BinXmlValue;
use crate::guid::Guid;

pub const TOKEN_EOF: u8 = 0x00;
pub const TOKEN_OPEN_START_ELEMENT: u8 = 0x01;
pub const TOKEN_OPEN_START_ELEMENT_WITH_ATTRIBUTES: u8 = 0x41;
pub const TOKEN_CLOSE_START_ELEMENT: u8 = 0x02;
pub const TOKEN_CLOSE_EMPTY_ELEMENT: u8 = 0x03;
pub const TOKEN_END_ELEMENT: u8 = 0x04;
pub const TOKEN_VALUE: u8 = 0x05;
pub const TOKEN_VALUE_WITH_MORE_DATA: u8 = 0x45;
pub const TOKEN_ATTRIBUTE_LAST: u8 = 0x06;
pub const TOKEN_ATTRIBUTE: u8 = 0x46;
pub const TOKEN_CHAR_REF: u8 = 0x08;
pub const TOKEN_ENTITY_REF: u8 = 0x09;
pub const TOKEN_ENTITY_REF_ALT: u8 = 0x49;
pub const TOKEN_TEMPLATE_INSTANCE: u8 = 0x0c;
pub const TOKEN_NORMAL_SUBSTITUTION: u8 = 0x0d;
pub const TOKEN_OPTIONAL_SUBSTITUTION: u8 = 0x0e;
pub const TOKEN_FRAGMENT_HEADER: u8 = 0x0f;

/// A single element of the flat binxml stream.
#[derive(Debug, PartialEq, Clone)]
pub enum Element {
    Fragment(Fragment),
    ElementStart(ElementStart),
    CloseStart,
    CloseEmpty,
    EndElement,
    ValueText(String),
    CharRef(u16),
    EntityRef(BinXmlName),
    NormalSubstitution(Substitution),
    OptionalSubstitution(Substitution),
    TemplateInstance(TemplateInstance),
    Eof,
}

#[derive(Debug, PartialEq, Clone)]
pub struct Fragment {
    pub header: FragmentHeader,
    pub element: Box<Element>,
}

#[repr(C)]
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct FragmentHeader {
    pub major_version: u8,
    pub minor_version: u8,
    pub flags: u8,
}

#[derive(Debug, PartialEq, Clone)]
pub struct ElementStart {
    /// Present only when the element is part of a template body.
    pub dependency_id: Option<i16>,
    pub data_size: u32,
    pub name: BinXmlName,
    pub attributes: Vec<Attribute>,
}

#[derive(Debug, PartialEq, Clone)]
pub struct Attribute {
    pub name: BinXmlName,
    pub data: Element,
}

#[derive(Debug, PartialEq, Eq, Clone)]
pub struct Substitution {
    // Zero-based (0 is the first replacement).
    pub substitution_index: i16,
    pub value_type: u8,
}

#[derive(Debug, PartialEq, Clone)]
pub struct TemplateDefinition {
    pub next_template_offset: u32,
    pub guid: Guid,
    /// Spans the fragment header, the element run and the EOF token.
    pub data_size: u32,
    pub elements: Vec<Element>,
}

/// A reference to a template definition plus the per-instance value array
/// that fills its substitution slots.
#[derive(Debug, PartialEq, Clone)]
pub struct TemplateInstance {
    pub definition: Rc<TemplateDefinition>,
    pub value_descriptors: Vec<ValueDescriptor>,
    pub values: Vec<BinXmlValue>,
}

#[derive(Debug, PartialEq, Eq, Clone)]
pub struct ValueDescriptor {
    pub size: u16,
    pub value_type: u8,
}
