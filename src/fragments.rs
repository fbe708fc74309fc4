use std::collections::HashMap;

/// The five keyed sections of an emitted sketch, in their output order.
/// Loop statements live outside this enum because they are positional,
/// never deduplicated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Section {
    Includes,
    Declarations,
    Variables,
    Functions,
    Setups,
}

/// Insertion-ordered, key-deduplicated store for one section.
#[derive(Debug, Default)]
struct Store {
    index: HashMap<String, usize>,
    entries: Vec<(String, String)>,
}

impl Store {
    fn add(&mut self, key: &str, code: &str, overwrite: bool) {
        match self.index.get(key) {
            Some(&slot) => {
                if overwrite {
                    // Position stays fixed at the first insertion.
                    self.entries[slot].1 = code.to_string();
                }
            }
            None => {
                self.index.insert(key.to_string(), self.entries.len());
                self.entries.push((key.to_string(), code.to_string()));
            }
        }
    }

    fn get(&self, key: &str) -> Option<&str> {
        self.index
            .get(key)
            .map(|&slot| self.entries[slot].1.as_str())
    }

    fn codes(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(_, code)| code.as_str())
    }

    fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Accumulates every fragment a pass produces and linearizes them into one
/// well-formed sketch. Rebuilt from scratch for every assembly pass.
#[derive(Debug, Default)]
pub struct FragmentRegistry {
    includes: Store,
    declarations: Store,
    variables: Store,
    functions: Store,
    setups: Store,
    loop_body: Vec<String>,
}

impl FragmentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, section: Section, key: &str, code: &str, overwrite: bool) {
        self.store_mut(section).add(key, code, overwrite);
    }

    pub fn add_include(&mut self, key: &str, code: &str) {
        self.add(Section::Includes, key, code, false);
    }

    pub fn add_declaration(&mut self, key: &str, code: &str) {
        self.add(Section::Declarations, key, code, false);
    }

    pub fn add_variable(&mut self, key: &str, code: &str, overwrite: bool) {
        self.add(Section::Variables, key, code, overwrite);
    }

    pub fn add_setup(&mut self, key: &str, code: &str, overwrite: bool) {
        self.add(Section::Setups, key, code, overwrite);
    }

    pub fn add_function(&mut self, key: &str, code: &str) {
        self.add(Section::Functions, key, code, false);
    }

    /// Appends one statement blob to the repeating-loop body. Loop
    /// statements are inherently sequential, so duplicates are kept.
    pub fn add_loop(&mut self, code: &str) {
        self.loop_body.push(code.to_string());
    }

    pub fn get(&self, section: Section, key: &str) -> Option<&str> {
        self.store(section).get(key)
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Concatenates every store into the final sketch text. Section order is
    /// fixed: includes, declarations, variables, functions, setup(), loop().
    /// Within a section, fragments appear in first-insertion order.
    pub fn linearize(&self) -> String {
        let mut sections: Vec<String> = Vec::new();
        for store in [
            &self.includes,
            &self.declarations,
            &self.variables,
            &self.functions,
        ] {
            if store.is_empty() {
                continue;
            }
            let body = store
                .codes()
                .map(|code| code.trim_end().to_string())
                .collect::<Vec<_>>()
                .join("\n");
            sections.push(body);
        }

        let setup_body = self
            .setups
            .codes()
            .map(|code| prefix_lines(code.trim_end(), "  "))
            .collect::<Vec<_>>()
            .join("\n");
        sections.push(wrap_routine("void setup()", &setup_body));

        let loop_body = self
            .loop_body
            .iter()
            .map(|code| prefix_lines(code.trim_end(), "  "))
            .collect::<Vec<_>>()
            .join("\n");
        sections.push(wrap_routine("void loop()", &loop_body));

        let mut out = sections.join("\n\n");
        out.push('\n');
        out
    }

    fn store(&self, section: Section) -> &Store {
        match section {
            Section::Includes => &self.includes,
            Section::Declarations => &self.declarations,
            Section::Variables => &self.variables,
            Section::Functions => &self.functions,
            Section::Setups => &self.setups,
        }
    }

    fn store_mut(&mut self, section: Section) -> &mut Store {
        match section {
            Section::Includes => &mut self.includes,
            Section::Declarations => &mut self.declarations,
            Section::Variables => &mut self.variables,
            Section::Functions => &mut self.functions,
            Section::Setups => &mut self.setups,
        }
    }
}

fn wrap_routine(signature: &str, body: &str) -> String {
    if body.is_empty() {
        format!("{} {{\n}}", signature)
    } else {
        format!("{} {{\n{}\n}}", signature, body)
    }
}

/// Indents every non-empty line of a multi-line blob.
pub fn prefix_lines(code: &str, prefix: &str) -> String {
    code.lines()
        .map(|line| {
            if line.trim().is_empty() {
                String::new()
            } else {
                format!("{}{}", prefix, line)
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}
