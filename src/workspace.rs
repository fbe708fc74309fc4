use anyhow::{anyhow, bail, Result};
use std::io::Cursor;
use std::path::Path;
use xmltree::Element;

/// One node of the visual program graph, as loaded from the interchange
/// document. The assembler treats it as opaque data; meaning comes from the
/// generator registered for `kind`.
#[derive(Debug, Clone)]
pub struct BlockNode {
    pub id: String,
    pub kind: String,
    pub fields: Vec<(String, String)>,
    pub values: Vec<(String, BlockNode)>,
    /// Statement sockets; each holds an already-flattened `<next>` chain.
    pub statements: Vec<(String, Vec<BlockNode>)>,
}

impl BlockNode {
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(field, _)| field == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn value(&self, name: &str) -> Option<&BlockNode> {
        self.values
            .iter()
            .find(|(socket, _)| socket == name)
            .map(|(_, block)| block)
    }

    pub fn statement(&self, name: &str) -> &[BlockNode] {
        self.statements
            .iter()
            .find(|(socket, _)| socket == name)
            .map(|(_, chain)| chain.as_slice())
            .unwrap_or(&[])
    }
}

/// A loaded visual program: the top-level statement chains in document order.
#[derive(Debug, Clone, Default)]
pub struct Program {
    pub roots: Vec<Vec<BlockNode>>,
}

impl Program {
    pub fn parse_file(path: &Path) -> Result<Program> {
        let source = std::fs::read_to_string(path)
            .map_err(|e| anyhow!("Cannot read workspace '{}': {}.", path.display(), e))?;
        Program::parse_str(&source)
    }

    /// Parses a Blockly-style `<xml>` workspace document.
    pub fn parse_str(source: &str) -> Result<Program> {
        let root = Element::parse(Cursor::new(source.as_bytes()))
            .map_err(|e| anyhow!("Invalid workspace XML: {}.", e))?;
        let mut loader = Loader { next_id: 0 };
        let mut roots = Vec::new();
        for child in child_elements(&root) {
            match child.name.as_str() {
                "block" | "shadow" => roots.push(loader.parse_chain(child)?),
                // Variable tables and settings elements carry no program.
                _ => {}
            }
        }
        Ok(Program { roots })
    }

    /// Every block in the program, depth-first in document order.
    pub fn iter_blocks(&self) -> Vec<&BlockNode> {
        let mut out = Vec::new();
        for chain in &self.roots {
            for block in chain {
                collect_blocks(block, &mut out);
            }
        }
        out
    }
}

fn collect_blocks<'a>(block: &'a BlockNode, out: &mut Vec<&'a BlockNode>) {
    out.push(block);
    for (_, value) in &block.values {
        collect_blocks(value, out);
    }
    for (_, chain) in &block.statements {
        for child in chain {
            collect_blocks(child, out);
        }
    }
}

struct Loader {
    next_id: usize,
}

impl Loader {
    /// Parses a `<block>` plus its `<next>` successors into a flat chain.
    fn parse_chain(&mut self, element: &Element) -> Result<Vec<BlockNode>> {
        let mut chain = Vec::new();
        let mut current = Some(element);
        while let Some(el) = current {
            let (block, next) = self.parse_block(el)?;
            chain.push(block);
            current = next;
        }
        Ok(chain)
    }

    fn parse_block<'a>(&mut self, element: &'a Element) -> Result<(BlockNode, Option<&'a Element>)> {
        let kind = match element.attributes.get("type") {
            Some(kind) if !kind.is_empty() => kind.clone(),
            _ => bail!("Workspace block element is missing its 'type' attribute."),
        };
        let id = element
            .attributes
            .get("id")
            .cloned()
            .unwrap_or_else(|| self.synthesize_id());

        let mut block = BlockNode {
            id,
            kind,
            fields: Vec::new(),
            values: Vec::new(),
            statements: Vec::new(),
        };
        let mut next = None;

        for child in child_elements(element) {
            match child.name.as_str() {
                "field" => {
                    let name = socket_name(child, "field")?;
                    let text = child.get_text().unwrap_or_default().to_string();
                    block.fields.push((name, text));
                }
                "value" => {
                    let name = socket_name(child, "value")?;
                    if let Some(inner) = socket_block(child) {
                        let (parsed, trailing) = self.parse_block(inner)?;
                        if trailing.is_some() {
                            bail!(
                                "Value socket '{}' of block '{}' must not chain blocks.",
                                name,
                                block.kind
                            );
                        }
                        block.values.push((name, parsed));
                    }
                }
                "statement" => {
                    let name = socket_name(child, "statement")?;
                    let chain = match socket_block(child) {
                        Some(inner) => self.parse_chain(inner)?,
                        None => Vec::new(),
                    };
                    block.statements.push((name, chain));
                }
                "next" => {
                    next = socket_block(child);
                }
                // Comments, mutations and UI metadata do not reach the engine.
                _ => {}
            }
        }
        Ok((block, next))
    }

    fn synthesize_id(&mut self) -> String {
        self.next_id += 1;
        format!("b{}", self.next_id)
    }
}

fn child_elements(element: &Element) -> impl Iterator<Item = &Element> {
    element.children.iter().filter_map(|node| node.as_element())
}

fn socket_name(element: &Element, what: &str) -> Result<String> {
    element
        .attributes
        .get("name")
        .cloned()
        .ok_or_else(|| anyhow!("Workspace {} element is missing its 'name' attribute.", what))
}

/// A socket may carry both a `<shadow>` default and a real `<block>`; the
/// real block wins.
fn socket_block(element: &Element) -> Option<&Element> {
    let mut shadow = None;
    for child in child_elements(element) {
        match child.name.as_str() {
            "block" => return Some(child),
            "shadow" => shadow = Some(child),
            _ => {}
        }
    }
    shadow
}
