use crate::binxml::model::{Element, ElementStart};

/// A node of the balanced element tree: a start element, the leaf elements
/// collected between its tags, and its child nodes. The root carries no
/// start element.
#[derive(Debug, Default)]
pub struct Node<'a> {
    pub start: Option<&'a ElementStart>,
    pub elements: Vec<&'a Element>,
    pub children: Vec<Node<'a>>,
}

/// Balances the flat element run of a template body into a tree.
pub fn node_tree(elements: &[Element]) -> Node<'_> {
    let (root, _) = build(elements, 0);
    root
}

fn build(elements: &[Element], mut index: usize) -> (Node<'_>, usize) {
    let mut node = Node::default();

    while index < elements.len() {
        match &elements[index] {
            Element::ElementStart(start) => {
                let (mut child, next_index) = build(elements, index + 1);
                child.start = Some(start);
                node.children.push(child);
                index = next_index;
            }
            // An unmatched close hands control back to the caller, so the
            // same routine serves the top level and nested runs.
            Element::EndElement | Element::CloseEmpty => return (node, index),
            // A delimiter inside a start tag; attributes already hang off
            // the element start.
            Element::CloseStart | Element::Eof => {}
            element => node.elements.push(element),
        }
        index += 1;
    }

    (node, index)
}
