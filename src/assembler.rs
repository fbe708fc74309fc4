use crate::boards::{BoardProfile, Catalog, PinClass, UnknownBoardError};
use crate::fragments::{prefix_lines, FragmentRegistry, Section};
use crate::pins::{PinType, ReservationLedger};
use crate::workspace::{BlockNode, Program};
use std::collections::HashMap;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Operator precedence of a generated C expression, loosest-binding operator
/// on top. The numeric value follows C's precedence table; `None` marks a
/// context with no binding pressure (or an expression of unknown shape, which
/// gets parenthesized wherever it is embedded).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Order {
    Atomic = 0,
    UnaryPostfix = 1,
    UnaryPrefix = 2,
    Multiplicative = 3,
    Additive = 4,
    Shift = 5,
    Relational = 6,
    Equality = 7,
    BitwiseAnd = 8,
    BitwiseXor = 9,
    BitwiseOr = 10,
    LogicalAnd = 11,
    LogicalOr = 12,
    Conditional = 13,
    Assignment = 14,
    None = 99,
}

/// What one translation call produced.
#[derive(Debug, Clone)]
pub enum Code {
    /// Statement blob, appended to the sequence the caller is building.
    Statement(String),
    /// Expression text plus the precedence of its loosest operator.
    Value(String, Order),
}

/// Fatal assembly failure: the graph is malformed (unknown block kind, value
/// block wired into a statement position, ...). No partial sketch is emitted.
#[derive(Debug, Clone)]
pub struct AssemblyError {
    pub message: String,
}

impl AssemblyError {
    pub fn new(message: impl Into<String>) -> Self {
        AssemblyError {
            message: message.into(),
        }
    }
}

impl Display for AssemblyError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl Error for AssemblyError {}

/// A non-fatal annotation on one block, keyed by a tag so later passes can
/// clear or replace just their own annotation kind.
#[derive(Debug, Clone)]
pub struct BlockWarning {
    pub block_id: String,
    pub tag: String,
    pub message: String,
}

/// Warning channel for a pass: per-block tagged annotations plus
/// program-level notes, both reported in the order first raised.
#[derive(Debug, Default)]
pub struct Diagnostics {
    slots: Vec<Option<BlockWarning>>,
    index: HashMap<(String, String), usize>,
    program: Vec<String>,
}

impl Diagnostics {
    /// Sets or clears the `tag` annotation on a block.
    pub fn set_block(&mut self, block_id: &str, tag: &str, message: Option<&str>) {
        let key = (block_id.to_string(), tag.to_string());
        match (self.index.get(&key), message) {
            (Some(&slot), Some(message)) => {
                self.slots[slot] = Some(BlockWarning {
                    block_id: block_id.to_string(),
                    tag: tag.to_string(),
                    message: message.to_string(),
                });
            }
            (Some(&slot), None) => self.slots[slot] = None,
            (None, Some(message)) => {
                self.index.insert(key, self.slots.len());
                self.slots.push(Some(BlockWarning {
                    block_id: block_id.to_string(),
                    tag: tag.to_string(),
                    message: message.to_string(),
                }));
            }
            (None, None) => {}
        }
    }

    pub fn add_program(&mut self, message: impl Into<String>) {
        self.program.push(message.into());
    }

    pub fn block_warnings(&self) -> impl Iterator<Item = &BlockWarning> {
        self.slots.iter().flatten()
    }

    pub fn warnings_for(&self, block_id: &str) -> Vec<&BlockWarning> {
        self.block_warnings()
            .filter(|w| w.block_id == block_id)
            .collect()
    }

    pub fn program_warnings(&self) -> &[String] {
        &self.program
    }

    pub fn is_empty(&self) -> bool {
        self.program.is_empty() && self.block_warnings().next().is_none()
    }
}

/// Declares that a block field holds a pin chosen from one profile class.
/// Used to re-validate saved pin values when the board selection changes.
#[derive(Debug, Clone, Copy)]
pub struct PinField {
    pub field: &'static str,
    pub class: PinClass,
}

/// Per-block generator contract. `translate` is required; the capability
/// methods are opt-in and default to "not implemented".
pub trait BlockGen {
    fn translate(&self, block: &BlockNode, ctx: &mut Session<'_>) -> Result<Code, AssemblyError>;

    /// Hardware profile this block insists on, if any.
    fn board_requirement(&self, _block: &BlockNode) -> Option<String> {
        Option::None
    }

    /// Pin-backed fields to re-validate on board change.
    fn pin_fields(&self) -> &'static [PinField] {
        &[]
    }
}

/// Lookup table from block kind to its generator.
#[derive(Default)]
pub struct GenRegistry {
    map: HashMap<String, Box<dyn BlockGen>>,
}

impl GenRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, kind: &str, gen: Box<dyn BlockGen>) {
        self.map.insert(kind.to_string(), gen);
    }

    pub fn get(&self, kind: &str) -> Option<&dyn BlockGen> {
        self.map.get(kind).map(Box::as_ref)
    }
}

/// Context for one assembly pass. Generators receive it mutably and feed the
/// fragment registry, the reservation ledger and the warning channel through
/// it; the active board profile travels here instead of in any global slot.
pub struct Session<'s> {
    registry: &'s GenRegistry,
    board: &'s BoardProfile,
    fragments: FragmentRegistry,
    ledger: ReservationLedger,
    diagnostics: Diagnostics,
}

impl<'s> Session<'s> {
    pub fn new(
        registry: &'s GenRegistry,
        board: &'s BoardProfile,
        diagnostics: Diagnostics,
    ) -> Session<'s> {
        Session {
            registry,
            board,
            fragments: FragmentRegistry::new(),
            ledger: ReservationLedger::new(),
            diagnostics,
        }
    }

    pub fn board(&self) -> &BoardProfile {
        self.board
    }

    pub fn add(&mut self, section: Section, key: &str, code: &str, overwrite: bool) {
        self.fragments.add(section, key, code, overwrite);
    }

    pub fn add_include(&mut self, key: &str, code: &str) {
        self.fragments.add_include(key, code);
    }

    pub fn add_declaration(&mut self, key: &str, code: &str) {
        self.fragments.add_declaration(key, code);
    }

    pub fn add_variable(&mut self, key: &str, code: &str, overwrite: bool) {
        self.fragments.add_variable(key, code, overwrite);
    }

    pub fn add_setup(&mut self, key: &str, code: &str, overwrite: bool) {
        self.fragments.add_setup(key, code, overwrite);
    }

    pub fn add_function(&mut self, key: &str, code: &str) {
        self.fragments.add_function(key, code);
    }

    /// Claims a pin for `block`; on a conflict both the holder and the new
    /// claimant are annotated and the pass carries on.
    pub fn reserve_pin(&mut self, block: &BlockNode, pin: &str, pin_type: PinType, purpose: &str) {
        if let Some(conflict) = self.ledger.reserve(pin, pin_type, purpose, &block.id) {
            let message = conflict.message();
            self.diagnostics
                .set_block(&conflict.holder_id, "pinRes", Some(&message));
            self.diagnostics
                .set_block(&conflict.claimant_id, "pinRes", Some(&message));
        }
    }

    pub fn warn(&mut self, block: &BlockNode, tag: &str, message: &str) {
        self.diagnostics.set_block(&block.id, tag, Some(message));
    }

    pub fn clear_warning(&mut self, block: &BlockNode, tag: &str) {
        self.diagnostics.set_block(&block.id, tag, Option::None);
    }

    /// Translates one node by dispatching to its registered generator.
    /// An unregistered kind is the malformed-graph condition and is fatal.
    pub fn translate_block(&mut self, block: &BlockNode) -> Result<Code, AssemblyError> {
        let registry = self.registry;
        let gen = registry.get(&block.kind).ok_or_else(|| {
            AssemblyError::new(format!(
                "Unknown block type '{}' (block '{}').",
                block.kind, block.id
            ))
        })?;
        gen.translate(block, self)
    }

    /// Translates the block attached to a value socket, parenthesizing when
    /// the produced expression binds looser than the surrounding context.
    /// `Ok(None)` means the socket is empty.
    pub fn value_to_code(
        &mut self,
        block: &BlockNode,
        socket: &str,
        outer: Order,
    ) -> Result<Option<String>, AssemblyError> {
        let Some(child) = block.value(socket) else {
            return Ok(Option::None);
        };
        match self.translate_block(child)? {
            Code::Value(code, inner) => Ok(Some(parenthesize(code, inner, outer))),
            Code::Statement(_) => Err(AssemblyError::new(format!(
                "Block '{}' in value socket '{}' of '{}' did not produce a value.",
                child.kind, socket, block.kind
            ))),
        }
    }

    /// `value_to_code` with a fallback for empty sockets.
    pub fn value_or(
        &mut self,
        block: &BlockNode,
        socket: &str,
        outer: Order,
        default: &str,
    ) -> Result<String, AssemblyError> {
        Ok(self
            .value_to_code(block, socket, outer)?
            .unwrap_or_else(|| default.to_string()))
    }

    /// Translates a statement socket's chain into one indented body blob.
    pub fn statement_to_code(
        &mut self,
        block: &BlockNode,
        socket: &str,
    ) -> Result<String, AssemblyError> {
        let mut parts = Vec::new();
        for child in block.statement(socket) {
            parts.push(self.statement_code(child)?);
        }
        Ok(prefix_lines(parts.join("\n").trim_end(), "  "))
    }

    fn statement_code(&mut self, block: &BlockNode) -> Result<String, AssemblyError> {
        match self.translate_block(block)? {
            Code::Statement(code) => Ok(code.trim_end().to_string()),
            // An orphan value is tolerated as an expression statement.
            Code::Value(code, _) => Ok(format!("{};", code)),
        }
    }

    fn into_parts(self) -> (FragmentRegistry, ReservationLedger, Diagnostics) {
        (self.fragments, self.ledger, self.diagnostics)
    }
}

fn parenthesize(code: String, inner: Order, outer: Order) -> String {
    let inner_rank = inner as u32;
    let outer_rank = outer as u32;
    if outer_rank <= inner_rank
        && !(outer_rank == inner_rank
            && (outer == Order::Atomic || outer == Order::None))
    {
        format!("({})", code)
    } else {
        code
    }
}

/// Swaps the catalog selection and re-validates every pin-backed field of the
/// loaded program against the new profile. Stale values raise the `bPin`
/// annotation; values valid again clear it.
pub fn select_board(
    catalog: &mut Catalog,
    id: &str,
    program: &Program,
    registry: &GenRegistry,
    diagnostics: &mut Diagnostics,
) -> Result<bool, UnknownBoardError> {
    let changed = catalog.select(id)?;
    if changed {
        refresh_pin_fields(program, catalog.selected(), registry, diagnostics);
    }
    Ok(changed)
}

fn refresh_pin_fields(
    program: &Program,
    board: &BoardProfile,
    registry: &GenRegistry,
    diagnostics: &mut Diagnostics,
) {
    for block in program.iter_blocks() {
        let Some(gen) = registry.get(&block.kind) else {
            continue;
        };
        for pin_field in gen.pin_fields() {
            let Some(value) = block.field(pin_field.field) else {
                continue;
            };
            if board.has_pin(pin_field.class, value) {
                diagnostics.set_block(&block.id, "bPin", Option::None);
            } else {
                let message = format!("The old pin value {} is no longer available.", value);
                diagnostics.set_block(&block.id, "bPin", Some(&message));
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassState {
    Idle,
    Walking,
    Linearizing,
    Done,
    Error,
}

/// Result of a completed pass: the sketch text plus everything the pass had
/// to say about the program.
#[derive(Debug)]
pub struct AssemblyOutput {
    pub code: String,
    pub board_id: String,
    pub diagnostics: Diagnostics,
}

/// Drives one full pass: board-requirement resolution, the depth-first walk,
/// then linearization. Every pass starts from a fresh fragment registry and
/// reservation ledger; there is no incremental re-assembly.
pub struct Assembler<'a> {
    registry: &'a GenRegistry,
    state: PassState,
}

impl<'a> Assembler<'a> {
    pub fn new(registry: &'a GenRegistry) -> Assembler<'a> {
        Assembler {
            registry,
            state: PassState::Idle,
        }
    }

    pub fn state(&self) -> PassState {
        self.state
    }

    pub fn assemble(
        &mut self,
        program: &Program,
        catalog: &mut Catalog,
    ) -> Result<AssemblyOutput, AssemblyError> {
        self.assemble_with(program, catalog, Diagnostics::default())
    }

    /// Runs a pass starting from pre-existing diagnostics (e.g. stale-pin
    /// annotations raised by a board selection made just before the pass).
    pub fn assemble_with(
        &mut self,
        program: &Program,
        catalog: &mut Catalog,
        mut diagnostics: Diagnostics,
    ) -> Result<AssemblyOutput, AssemblyError> {
        self.state = PassState::Walking;
        self.resolve_board_requirements(program, catalog, &mut diagnostics);

        let board = catalog.selected();
        let mut session = Session::new(self.registry, board, diagnostics);
        for chain in &program.roots {
            for block in chain {
                let code = match session.translate_block(block) {
                    Ok(code) => code,
                    Err(err) => {
                        self.state = PassState::Error;
                        return Err(err);
                    }
                };
                match code {
                    Code::Statement(text) => {
                        if !text.trim().is_empty() {
                            session.fragments.add_loop(text.trim_end());
                        }
                    }
                    Code::Value(text, _) => session.fragments.add_loop(&format!("{};", text)),
                }
            }
        }

        self.state = PassState::Linearizing;
        let (fragments, _ledger, diagnostics) = session.into_parts();
        let code = fragments.linearize();
        self.state = PassState::Done;
        Ok(AssemblyOutput {
            code,
            board_id: catalog.selected_id().to_string(),
            diagnostics,
        })
    }

    /// Collects every declared board requirement. Exactly one distinct value
    /// drives the selection toward it; more than one raises a single
    /// program-level warning and leaves the selection alone.
    fn resolve_board_requirements(
        &self,
        program: &Program,
        catalog: &mut Catalog,
        diagnostics: &mut Diagnostics,
    ) {
        let mut required: Vec<String> = Vec::new();
        for block in program.iter_blocks() {
            let Some(gen) = self.registry.get(&block.kind) else {
                continue;
            };
            if let Some(requirement) = gen.board_requirement(block) {
                if !required.contains(&requirement) {
                    required.push(requirement);
                }
            }
        }
        match required.as_slice() {
            [] => {}
            [only] => {
                if only != catalog.selected_id() {
                    match select_board(catalog, only, program, self.registry, diagnostics) {
                        Ok(_) => {}
                        Err(err) => diagnostics.add_program(err.to_string()),
                    }
                }
            }
            many => diagnostics.add_program(format!(
                "Conflicting board requirement: {}.",
                many.join(", ")
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blocks::builtin_registry;

    fn assemble_str(source: &str) -> (AssemblyOutput, Catalog) {
        let registry = builtin_registry();
        let program = Program::parse_str(source).unwrap();
        let mut catalog = Catalog::builtin();
        let output = Assembler::new(&registry)
            .assemble(&program, &mut catalog)
            .unwrap();
        (output, catalog)
    }

    #[test]
    fn parenthesize_follows_precedence() {
        assert_eq!(
            parenthesize("1 + 2".into(), Order::Additive, Order::Multiplicative),
            "(1 + 2)"
        );
        assert_eq!(
            parenthesize("1 * 2".into(), Order::Multiplicative, Order::Additive),
            "1 * 2"
        );
        assert_eq!(parenthesize("x".into(), Order::Atomic, Order::Atomic), "x");
        assert_eq!(
            parenthesize("a + b".into(), Order::Additive, Order::Additive),
            "(a + b)"
        );
    }

    #[test]
    fn unknown_block_type_is_fatal_and_enters_error_state() {
        let registry = builtin_registry();
        let program = Program::parse_str("<xml><block type=\"no_such_block\" id=\"x\"/></xml>").unwrap();
        let mut catalog = Catalog::builtin();
        let mut assembler = Assembler::new(&registry);
        let err = assembler.assemble(&program, &mut catalog).unwrap_err();
        assert!(err.message.contains("no_such_block"));
        assert_eq!(assembler.state(), PassState::Error);
    }

    #[test]
    fn assembly_is_deterministic() {
        let source = r#"
<xml>
  <block type="io_tone" id="t1">
    <field name="TONEPIN">9</field>
    <value name="FREQUENCY"><block type="math_number"><field name="NUM">440</field></block></value>
    <next>
      <block type="io_digitalwrite" id="d1">
        <field name="PIN">13</field>
        <value name="STATE"><block type="io_highlow"><field name="STATE">HIGH</field></block></value>
      </block>
    </next>
  </block>
</xml>"#;
        let (first, _) = assemble_str(source);
        let (second, _) = assemble_str(source);
        assert_eq!(first.code, second.code);
    }

    #[test]
    fn pin_conflict_warns_both_blocks_and_still_emits() {
        let source = r#"
<xml>
  <block type="io_tone" id="tone1">
    <field name="TONEPIN">13</field>
    <value name="FREQUENCY"><block type="math_number"><field name="NUM">440</field></block></value>
    <next>
      <block type="io_digitalwrite" id="write1">
        <field name="PIN">13</field>
        <value name="STATE"><block type="io_highlow"><field name="STATE">HIGH</field></block></value>
      </block>
    </next>
  </block>
</xml>"#;
        let (output, _) = assemble_str(source);
        let tone = output.diagnostics.warnings_for("tone1");
        let write = output.diagnostics.warnings_for("write1");
        assert_eq!(tone.len(), 1);
        assert_eq!(write.len(), 1);
        assert_eq!(
            tone[0].message,
            "Pin 13 needed for Digital Write is already used as Tone Pin."
        );
        assert_eq!(tone[0].message, write[0].message);
        // Output is still produced, with both uses present.
        assert!(output.code.contains("tone(13, 440);"));
        assert!(output.code.contains("digitalWrite(13, HIGH);"));
    }

    #[test]
    fn distinct_pins_raise_no_warnings() {
        let source = r#"
<xml>
  <block type="io_tone" id="t1">
    <field name="TONEPIN">9</field>
    <value name="FREQUENCY"><block type="math_number"><field name="NUM">220</field></block></value>
    <next>
      <block type="io_notone" id="t2"><field name="TONEPIN">10</field></block>
    </next>
  </block>
</xml>"#;
        let (output, _) = assemble_str(source);
        assert!(output.diagnostics.is_empty());
    }

    #[test]
    fn board_switch_refreshes_pin_fields() {
        let registry = builtin_registry();
        // Pin 22 only exists on the mega.
        let program = Program::parse_str(
            r#"
<xml>
  <block type="io_digitalwrite" id="d1">
    <field name="PIN">22</field>
    <value name="STATE"><block type="io_highlow"><field name="STATE">LOW</field></block></value>
  </block>
</xml>"#,
        )
        .unwrap();
        let mut catalog = Catalog::builtin();
        catalog.select("mega").unwrap();
        let mut diagnostics = Diagnostics::default();
        let changed =
            select_board(&mut catalog, "uno", &program, &registry, &mut diagnostics).unwrap();
        assert!(changed);
        let warnings = diagnostics.warnings_for("d1");
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].tag, "bPin");
        assert_eq!(
            warnings[0].message,
            "The old pin value 22 is no longer available."
        );

        // Switching back clears the annotation.
        select_board(&mut catalog, "mega", &program, &registry, &mut diagnostics).unwrap();
        assert!(diagnostics.warnings_for("d1").is_empty());
    }

    #[test]
    fn single_board_requirement_drives_selection() {
        let source = r#"
<xml>
  <block type="allbot_servo_hub" id="hub1">
    <field name="MODEL">allbot_vr204_uno</field>
    <field name="NAMESERVO">ankleLeft</field>
    <field name="PIN">9</field>
  </block>
</xml>"#;
        let (output, catalog) = assemble_str(source);
        assert_eq!(catalog.selected_id(), "allbot_vr204_uno");
        assert_eq!(output.board_id, "allbot_vr204_uno");
        assert!(output.diagnostics.program_warnings().is_empty());
    }

    #[test]
    fn conflicting_board_requirements_warn_once_and_keep_selection() {
        struct Requires(&'static str);
        impl BlockGen for Requires {
            fn translate(
                &self,
                _block: &BlockNode,
                _ctx: &mut Session<'_>,
            ) -> Result<Code, AssemblyError> {
                Ok(Code::Statement(String::new()))
            }
            fn board_requirement(&self, _block: &BlockNode) -> Option<String> {
                Some(self.0.to_string())
            }
        }

        let mut registry = GenRegistry::new();
        registry.register("needs_uno", Box::new(Requires("uno")));
        registry.register("needs_mega", Box::new(Requires("mega")));
        let program = Program::parse_str(
            "<xml><block type=\"needs_uno\" id=\"a\"/><block type=\"needs_mega\" id=\"b\"/></xml>",
        )
        .unwrap();
        let mut catalog = Catalog::builtin();
        let output = Assembler::new(&registry)
            .assemble(&program, &mut catalog)
            .unwrap();
        assert_eq!(catalog.selected_id(), "uno");
        assert_eq!(output.diagnostics.program_warnings().len(), 1);
        assert!(output.diagnostics.program_warnings()[0]
            .contains("Conflicting board requirement: uno, mega."));
    }

    #[test]
    fn missing_collaborator_degrades_to_placeholder() {
        // A chirp block with no AllBot hub anywhere in the program.
        let source = r#"
<xml>
  <block type="allbot_chirp" id="c1">
    <value name="BEEPS"><block type="math_number"><field name="NUM">3</field></block></value>
    <value name="SPEED"><block type="math_number"><field name="NUM">50</field></block></value>
  </block>
</xml>"#;
        let (output, _) = assemble_str(source);
        assert!(output
            .code
            .contains("// No AllBot on the workspace. Add it to generate code"));
    }

    #[test]
    fn top_level_value_block_becomes_expression_statement() {
        let (output, _) =
            assemble_str("<xml><block type=\"time_millis\" id=\"m1\"/></xml>");
        assert!(output.code.contains("millis();"));
    }
}
