//! Protocol-message node: a tag, string attributes, and either raw bytes or
//! child nodes. Only the shape is modelled here; framing lives elsewhere.

use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum NodeContent {
    #[default]
    Empty,
    Bytes(Vec<u8>),
    Nodes(Vec<BinaryNode>),
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BinaryNode {
    pub tag: String,
    pub attrs: BTreeMap<String, String>,
    pub content: NodeContent,
}

impl BinaryNode {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            ..Default::default()
        }
    }

    pub fn attr(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attrs.insert(key.into(), value.into());
        self
    }

    pub fn bytes(mut self, data: impl Into<Vec<u8>>) -> Self {
        self.content = NodeContent::Bytes(data.into());
        self
    }

    pub fn children(mut self, nodes: Vec<BinaryNode>) -> Self {
        self.content = NodeContent::Nodes(nodes);
        self
    }

    pub fn get_attr(&self, key: &str) -> Option<&str> {
        self.attrs.get(key).map(String::as_str)
    }

    /// First direct child with the given tag.
    pub fn child(&self, tag: &str) -> Option<&BinaryNode> {
        match &self.content {
            NodeContent::Nodes(nodes) => nodes.iter().find(|n| n.tag == tag),
            _ => None,
        }
    }

    /// Byte content of the first direct child with the given tag.
    pub fn child_bytes(&self, tag: &str) -> Option<&[u8]> {
        match &self.child(tag)?.content {
            NodeContent::Bytes(b) => Some(b.as_slice()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> BinaryNode {
        BinaryNode::new("receipt").attr("id", "X1").children(vec![
            BinaryNode::new("encrypt").children(vec![
                BinaryNode::new("enc_p").bytes(vec![1, 2, 3]),
                BinaryNode::new("enc_iv").bytes(vec![9; 12]),
            ]),
            BinaryNode::new("rmr").attr("from_me", "true"),
        ])
    }

    #[test]
    fn child_lookup() {
        let node = sample();
        assert_eq!(node.get_attr("id"), Some("X1"));
        let enc = node.child("encrypt").unwrap();
        assert_eq!(enc.child_bytes("enc_p"), Some(&[1u8, 2, 3][..]));
        assert_eq!(enc.child_bytes("enc_iv").map(<[u8]>::len), Some(12));
        assert!(node.child("error").is_none());
    }

    #[test]
    fn child_bytes_on_container_is_none() {
        let node = sample();
        assert!(node.child_bytes("encrypt").is_none());
        assert!(node.child_bytes("rmr").is_none());
    }
}
