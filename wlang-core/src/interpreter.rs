//! Tree-walking interpreter.
//!
//! Every call gets its own [`Frame`]: a stack of block scopes searched
//! innermost first, then the bound instance's fields, then the file's
//! globals. Statement outcomes travel up as [`Flow`] values; script-level
//! throws are one of those outcomes, never a Rust error.

use std::collections::{HashMap, HashSet};

use tracing::{debug, trace};

use crate::ast::{BlockKind, Expr, Statement, StatementKind, TopLevel};
use crate::builtins::{Console, SystemFunctionKind, find_system_function};
use crate::error::{CoreError, RuntimeFault};
use crate::host::{HostBridge, HostFault, HostReceiver, TypeHandle};
use crate::lexer::{Token, TokenKind};
use crate::operators::{apply_binary, apply_unary};
use crate::runtime::{FunctionMember, Program, Scope, TypeDefinition, TypeId};
use crate::value::{InstanceId, Value, VariableMember};

/// Outcome of executing a statement.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Flow {
    Normal,
    Break,
    Continue,
    Return(Value),
    Thrown(Thrown),
}

/// A thrown value unwinding towards a matching `catch`.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Thrown {
    pub(crate) value: Value,
    /// Runtime type name followed by ancestor names.
    pub(crate) type_names: Vec<String>,
    pub(crate) line: usize,
}

impl Thrown {
    /// `declared` matches a type name in full or by last dotted segment.
    fn matches(&self, declared: &str) -> bool {
        let short = last_segment(declared);
        self.type_names
            .iter()
            .any(|name| name == declared || last_segment(name) == short)
    }

    fn type_name(&self) -> String {
        self.type_names
            .first()
            .cloned()
            .unwrap_or_else(|| "value".to_string())
    }
}

fn last_segment(name: &str) -> &str {
    name.rsplit('.').next().unwrap_or(name)
}

/// Why expression evaluation stopped early.
#[derive(Debug)]
enum Interrupt {
    Fault(RuntimeFault),
    Throw(Thrown),
}

impl From<RuntimeFault> for Interrupt {
    fn from(fault: RuntimeFault) -> Self {
        Interrupt::Fault(fault)
    }
}

fn host_interrupt(fault: HostFault, line: usize) -> Interrupt {
    match fault {
        HostFault::Failed(message) => Interrupt::Fault(RuntimeFault::Host { message, line }),
        HostFault::Thrown { type_name, value } => Interrupt::Throw(Thrown {
            value,
            type_names: vec![type_name],
            line,
        }),
    }
}

/// Turn a pending throw back into a control-flow outcome.
fn catch_throw(result: Result<Flow, Interrupt>) -> Result<Flow, RuntimeFault> {
    match result {
        Ok(flow) => Ok(flow),
        Err(Interrupt::Throw(thrown)) => Ok(Flow::Thrown(thrown)),
        Err(Interrupt::Fault(fault)) => Err(fault),
    }
}

fn constant_value(token: &Token) -> Result<Value, RuntimeFault> {
    let invalid = || RuntimeFault::InvalidNumber {
        literal: token.content.clone(),
        line: token.line,
    };
    match token.kind {
        TokenKind::True => Ok(Value::Bool(true)),
        TokenKind::False => Ok(Value::Bool(false)),
        TokenKind::Null => Ok(Value::Void),
        TokenKind::Integer => token.content.parse().map(Value::Int).map_err(|_| invalid()),
        TokenKind::Double => token
            .content
            .parse()
            .map(Value::Double)
            .map_err(|_| invalid()),
        _ => Err(invalid()),
    }
}

#[derive(Debug)]
struct Instance {
    ty: TypeId,
    /// `this`, `super` when the type has a parent, then the fields.
    slots: Scope,
}

struct Frame {
    file: usize,
    instance: Option<InstanceId>,
    scopes: Vec<Scope>,
    /// Intermediate expression results; cleared between statements.
    stack: Vec<Value>,
    /// Whether the last `if`/`else if` in this call took its branch.
    if_taken: bool,
}

impl Frame {
    fn new(file: usize, instance: Option<InstanceId>) -> Self {
        Frame {
            file,
            instance,
            scopes: Vec::new(),
            stack: Vec::new(),
            if_taken: false,
        }
    }

    /// Every pop pairs with a push made by `eval` for the same node.
    fn pop(&mut self) -> Value {
        debug_assert!(!self.stack.is_empty(), "evaluation stack underflow");
        self.stack.pop().unwrap_or(Value::Void)
    }
}

/// Location of a variable slot.
#[derive(Debug, Clone, Copy)]
enum Slot {
    Local(usize, usize),
    Field(InstanceId, usize),
    Global(usize, usize),
}

pub struct Interpreter<'a> {
    program: &'a Program,
    host: &'a mut dyn HostBridge,
    console: &'a mut dyn Console,
    heap: Vec<Instance>,
    globals: Vec<Scope>,
    builtin_types: HashSet<String>,
    /// Qualified host type name to its resolved handle.
    resolved_types: HashMap<String, TypeHandle>,
    /// File of the innermost running code, for fault attribution.
    current_file: usize,
}

impl<'a> Interpreter<'a> {
    /// File-scope slots start out void.
    pub fn new(
        program: &'a Program,
        host: &'a mut dyn HostBridge,
        console: &'a mut dyn Console,
    ) -> Self {
        let globals = program
            .files
            .iter()
            .map(|file| {
                let mut scope = Scope::default();
                for variable in &file.variables {
                    scope.declare(VariableMember::new(
                        variable.name.content.clone(),
                        variable.constant,
                        Value::Void,
                    ));
                }
                scope
            })
            .collect();
        let builtin_types = host.builtin_types().into_iter().collect();

        Interpreter {
            program,
            host,
            console,
            heap: Vec::new(),
            globals,
            builtin_types,
            resolved_types: HashMap::new(),
            current_file: 0,
        }
    }

    /// Run each file's variable initializers and top-level statements, in
    /// file order and source order within a file.
    pub fn initialize(&mut self) -> Result<(), CoreError> {
        let program = self.program;
        for (index, file) in program.files.iter().enumerate() {
            self.current_file = index;
            let mut frame = Frame::new(index, None);
            for item in &file.top_level {
                let result = match item {
                    TopLevel::Variable(slot) => self.initialize_global(&mut frame, index, *slot),
                    TopLevel::Statement(statement) => self.exec_statement(&mut frame, statement),
                };
                self.settle(result)?;
            }
            debug!(file = %file.name, "file initialized");
        }
        Ok(())
    }

    /// Invoke a zero-argument function declared in file `file`.
    pub fn call_entry(&mut self, file: usize, name: &str) -> Result<Value, CoreError> {
        let program = self.program;
        let Some(file_name) = program.files.get(file).map(|f| f.name.clone()) else {
            return Err(CoreError::UnknownEntryFile(file.to_string()));
        };
        let Some(function) = program.function(name, 0).filter(|f| f.file == file) else {
            return Err(CoreError::MissingEntry {
                file: file_name,
                name: name.to_string(),
            });
        };

        debug!(entry = name, file = %file_name, "invoking entry function");
        self.current_file = file;
        match self.invoke(function, None, Vec::new()) {
            Ok(value) => Ok(value),
            Err(Interrupt::Throw(thrown)) => self.settle(Ok(Flow::Thrown(thrown))),
            Err(Interrupt::Fault(fault)) => Err(self.fault(fault)),
        }
    }

    /// Current value of a file-scope variable.
    pub fn global(&self, file: usize, name: &str) -> Option<&Value> {
        self.globals
            .get(file)?
            .lookup(name)
            .map(|slot| &slot.value)
    }

    /// Display text of a value, as `print` writes it.
    pub fn render(&self, value: &Value) -> String {
        match value {
            Value::Void => "null".to_string(),
            Value::Bool(value) => value.to_string(),
            Value::Int(value) => value.to_string(),
            Value::Double(value) => format!("{value:?}"),
            Value::Str(value) => value.clone(),
            Value::Object(id) => format!("<{}#{}>", self.class_name(*id), id.0),
            Value::Host(handle) => format!("<{}>", self.host.type_name(*handle)),
            Value::HostType(handle) => {
                let name = self
                    .resolved_types
                    .iter()
                    .find(|(_, resolved)| *resolved == handle)
                    .map_or("host type", |(name, _)| name.as_str());
                format!("<type {name}>")
            }
        }
    }

    fn fault(&self, source: RuntimeFault) -> CoreError {
        let file = self
            .program
            .files
            .get(self.current_file)
            .map(|file| file.name.clone())
            .unwrap_or_default();
        CoreError::Runtime { file, source }
    }

    /// Outcome of top-level code: a throw nobody caught is a fault.
    fn settle(&self, result: Result<Flow, RuntimeFault>) -> Result<Value, CoreError> {
        match result {
            Ok(Flow::Return(value)) => Ok(value),
            Ok(Flow::Thrown(thrown)) => Err(self.fault(RuntimeFault::Uncaught {
                type_name: thrown.type_name(),
                line: thrown.line,
            })),
            Ok(_) => Ok(Value::Void),
            Err(fault) => Err(self.fault(fault)),
        }
    }

    fn initialize_global(
        &mut self,
        frame: &mut Frame,
        file: usize,
        slot: usize,
    ) -> Result<Flow, RuntimeFault> {
        let program = self.program;
        let Some(decl) = program.files.get(file).and_then(|f| f.variables.get(slot)) else {
            return Ok(Flow::Normal);
        };
        let Some(init) = &decl.init else {
            return Ok(Flow::Normal);
        };
        frame.stack.clear();
        let value = match self.evaluate(frame, init) {
            Ok(value) => value,
            Err(interrupt) => return catch_throw(Err(interrupt)),
        };
        if let Some(member) = self.globals.get_mut(file).and_then(|scope| scope.get_mut(slot)) {
            member.value = value;
        }
        Ok(Flow::Normal)
    }

    // -----------------------------------------------------------------
    // Statements
    // -----------------------------------------------------------------

    fn exec_statements(
        &mut self,
        frame: &mut Frame,
        statements: &'a [Statement],
    ) -> Result<Flow, RuntimeFault> {
        let mut index = 0;
        while index < statements.len() {
            let statement = &statements[index];
            index += 1;
            let flow = match &statement.kind {
                StatementKind::Block {
                    kind: BlockKind::Try,
                    body,
                } => {
                    let first_catch = index;
                    while statements.get(index).is_some_and(is_catch) {
                        index += 1;
                    }
                    self.exec_try(frame, body, &statements[first_catch..index])?
                }
                _ => self.exec_statement(frame, statement)?,
            };
            if flow != Flow::Normal {
                return Ok(flow);
            }
        }
        Ok(Flow::Normal)
    }

    fn exec_statement(
        &mut self,
        frame: &mut Frame,
        statement: &'a Statement,
    ) -> Result<Flow, RuntimeFault> {
        frame.stack.clear();
        catch_throw(self.exec_statement_inner(frame, statement))
    }

    fn exec_statement_inner(
        &mut self,
        frame: &mut Frame,
        statement: &'a Statement,
    ) -> Result<Flow, Interrupt> {
        match &statement.kind {
            StatementKind::Expression(expr) => {
                self.evaluate(frame, expr)?;
                Ok(Flow::Normal)
            }
            StatementKind::VarDecl {
                name,
                constant,
                init,
                ..
            } => {
                let slot = self.declare_local(frame, name, *constant)?;
                if let Some(init) = init {
                    let value = self.evaluate(frame, init)?;
                    if let Some(member) = self.slot_mut(frame, slot) {
                        member.value = value;
                    }
                }
                Ok(Flow::Normal)
            }
            StatementKind::Return(value) => {
                let value = match value {
                    Some(expr) => self.evaluate(frame, expr)?,
                    None => Value::Void,
                };
                Ok(Flow::Return(value))
            }
            StatementKind::Break => Ok(Flow::Break),
            StatementKind::Continue => Ok(Flow::Continue),
            StatementKind::Throw(expr) => {
                let value = self.evaluate(frame, expr)?;
                Ok(Flow::Thrown(self.thrown(value, statement.line)))
            }
            StatementKind::Block { kind, body } => self.exec_block(frame, kind, body),
        }
    }

    /// New slot in the innermost scope. Top-level code has no block scope;
    /// its variables already exist as globals.
    fn declare_local(
        &mut self,
        frame: &mut Frame,
        name: &Token,
        constant: bool,
    ) -> Result<Slot, RuntimeFault> {
        let Some(depth) = frame.scopes.len().checked_sub(1) else {
            return self
                .globals
                .get(frame.file)
                .and_then(|scope| scope.position(&name.content))
                .map(|index| Slot::Global(frame.file, index))
                .ok_or_else(|| RuntimeFault::UndefinedVariable {
                    name: name.content.clone(),
                    line: name.line,
                });
        };
        let scope = &mut frame.scopes[depth];
        if !scope.declare(VariableMember::new(name.content.clone(), constant, Value::Void)) {
            return Err(RuntimeFault::DuplicateVariable {
                name: name.content.clone(),
                line: name.line,
            });
        }
        let index = scope.position(&name.content).unwrap_or_default();
        Ok(Slot::Local(depth, index))
    }

    fn exec_block(
        &mut self,
        frame: &mut Frame,
        kind: &'a BlockKind,
        body: &'a [Statement],
    ) -> Result<Flow, Interrupt> {
        match kind {
            BlockKind::If {
                condition,
                else_chain,
            } => {
                if *else_chain && frame.if_taken {
                    return Ok(Flow::Normal);
                }
                let taken = match condition {
                    Some(condition) => self.condition(frame, condition)?,
                    None => true,
                };
                frame.if_taken = taken;
                if !taken {
                    return Ok(Flow::Normal);
                }
                let flow = self.exec_body(frame, body)?;
                // Nested ifs in the body reuse the flag.
                frame.if_taken = true;
                Ok(flow)
            }
            BlockKind::While { condition } => {
                while self.condition(frame, condition)? {
                    match self.exec_body(frame, body)? {
                        Flow::Break => break,
                        Flow::Normal | Flow::Continue => {}
                        other => return Ok(other),
                    }
                }
                Ok(Flow::Normal)
            }
            BlockKind::For { init, check, step } => self.scoped(frame, |this, frame| -> Result<Flow, Interrupt> {
                if let Some(init) = init {
                    let flow = this.exec_statement(frame, init)?;
                    if flow != Flow::Normal {
                        return Ok(flow);
                    }
                }
                loop {
                    if let Some(check) = check {
                        if !this.condition(frame, check)? {
                            break;
                        }
                    }
                    match this.exec_body(frame, body)? {
                        Flow::Break => break,
                        Flow::Normal | Flow::Continue => {}
                        other => return Ok(other),
                    }
                    if let Some(step) = step {
                        frame.stack.clear();
                        this.evaluate(frame, step)?;
                    }
                }
                Ok(Flow::Normal)
            }),
            BlockKind::Try | BlockKind::General => Ok(self.exec_body(frame, body)?),
            // Catch bodies only run through `exec_try`.
            BlockKind::Catch { .. } => Ok(Flow::Normal),
        }
    }

    fn exec_try(
        &mut self,
        frame: &mut Frame,
        body: &'a [Statement],
        catches: &'a [Statement],
    ) -> Result<Flow, RuntimeFault> {
        let flow = self.exec_body(frame, body)?;
        let Flow::Thrown(thrown) = flow else {
            return Ok(flow);
        };

        for catch in catches {
            let StatementKind::Block {
                kind:
                    BlockKind::Catch {
                        exception_names,
                        binding,
                    },
                body,
            } = &catch.kind
            else {
                continue;
            };
            if !exception_names.iter().any(|name| thrown.matches(name)) {
                continue;
            }
            trace!(line = catch.line, exception = %thrown.type_name(), "caught");
            return self.scoped(frame, |this, frame| {
                if let (Some(binding), Some(scope)) = (binding, frame.scopes.last_mut()) {
                    scope.declare(VariableMember::new(
                        binding.clone(),
                        false,
                        thrown.value.clone(),
                    ));
                }
                this.exec_statements(frame, body)
            });
        }
        Ok(Flow::Thrown(thrown))
    }

    fn exec_body(
        &mut self,
        frame: &mut Frame,
        body: &'a [Statement],
    ) -> Result<Flow, RuntimeFault> {
        self.scoped(frame, |this, frame| this.exec_statements(frame, body))
    }

    fn scoped<T>(
        &mut self,
        frame: &mut Frame,
        run: impl FnOnce(&mut Self, &mut Frame) -> T,
    ) -> T {
        frame.scopes.push(Scope::default());
        let result = run(self, frame);
        frame.scopes.pop();
        result
    }

    fn condition(&mut self, frame: &mut Frame, expr: &'a Expr) -> Result<bool, Interrupt> {
        match self.evaluate(frame, expr)? {
            Value::Bool(value) => Ok(value),
            other => Err(RuntimeFault::ConditionNotBoolean {
                found: other.type_name(),
                line: expr.line(),
            }
            .into()),
        }
    }

    fn thrown(&self, value: Value, line: usize) -> Thrown {
        let type_names = match &value {
            Value::Object(id) => match self.heap.get(id.0) {
                Some(instance) => self
                    .program
                    .lineage(instance.ty)
                    .into_iter()
                    .map(|ty| self.program.type_def(ty).name.clone())
                    .collect(),
                None => vec![value.type_name().to_string()],
            },
            Value::Host(handle) => vec![self.host.type_name(*handle)],
            other => vec![other.type_name().to_string()],
        };
        Thrown {
            value,
            type_names,
            line,
        }
    }

    // -----------------------------------------------------------------
    // Expressions
    // -----------------------------------------------------------------

    fn evaluate(&mut self, frame: &mut Frame, expr: &'a Expr) -> Result<Value, Interrupt> {
        self.eval(frame, expr)?;
        Ok(frame.pop())
    }

    /// Evaluate `expr` and push its value on the frame's stack.
    fn eval(&mut self, frame: &mut Frame, expr: &'a Expr) -> Result<(), Interrupt> {
        let value = match expr {
            Expr::Constant(token) => constant_value(token)?,
            Expr::Literal(token) => Value::Str(token.content.clone()),
            Expr::Identifier(token) => self.read_variable(frame, token)?,
            Expr::Unary { op, operand } => {
                self.eval(frame, operand)?;
                let operand = frame.pop();
                apply_unary(op, operand)?
            }
            Expr::Binary { op, left, right } if op.is(TokenKind::Assign) => {
                self.assign(frame, left, right)?
            }
            Expr::Binary { op, left, right } => {
                self.eval(frame, left)?;
                self.eval(frame, right)?;
                let right = frame.pop();
                let left = frame.pop();
                apply_binary(op, left, right, |value| self.render(value))?
            }
            Expr::MemberAccess { target, member, .. } => {
                let receiver = self.receiver(frame, target)?;
                self.get_member(&receiver, member)?
            }
            Expr::Call { callee, name, args } => self.call(frame, callee, name, args)?,
        };
        frame.stack.push(value);
        Ok(())
    }

    fn evaluate_args(
        &mut self,
        frame: &mut Frame,
        args: &'a [Expr],
    ) -> Result<Vec<Value>, Interrupt> {
        let base = frame.stack.len();
        for arg in args {
            self.eval(frame, arg)?;
        }
        Ok(frame.stack.split_off(base))
    }

    fn read_variable(&self, frame: &Frame, token: &Token) -> Result<Value, RuntimeFault> {
        self.locate(frame, &token.content)
            .and_then(|slot| self.slot_ref(frame, slot))
            .map(|member| member.value.clone())
            .ok_or_else(|| RuntimeFault::UndefinedVariable {
                name: token.content.clone(),
                line: token.line,
            })
    }

    /// Left side of a `.`: a bare host type name yields the type itself.
    fn receiver(&mut self, frame: &mut Frame, target: &'a Expr) -> Result<Value, Interrupt> {
        if let Expr::Identifier(token) = target {
            if self.locate(frame, &token.content).is_none()
                && self.is_host_type(frame.file, &token.content)
            {
                return Ok(Value::HostType(self.host_type(frame.file, token)?));
            }
        }
        self.evaluate(frame, target)
    }

    fn assign(
        &mut self,
        frame: &mut Frame,
        target: &'a Expr,
        value: &'a Expr,
    ) -> Result<Value, Interrupt> {
        let value = self.evaluate(frame, value)?;
        match target {
            Expr::Identifier(token) => {
                let slot = self.locate(frame, &token.content).ok_or_else(|| {
                    RuntimeFault::UndefinedVariable {
                        name: token.content.clone(),
                        line: token.line,
                    }
                })?;
                self.store(frame, slot, token, value.clone())?;
            }
            Expr::MemberAccess { target, member, .. } => {
                match self.receiver(frame, target)? {
                    Value::Object(id) => {
                        let (owner, index) =
                            self.field_slot(id, &member.content).ok_or_else(|| {
                                RuntimeFault::MissingMember {
                                    type_name: self.class_name(id),
                                    member: member.content.clone(),
                                    line: member.line,
                                }
                            })?;
                        self.store(frame, Slot::Field(owner, index), member, value.clone())?;
                    }
                    Value::Host(handle) => self
                        .host
                        .set_field(handle, &member.content, value.clone())
                        .map_err(|fault| host_interrupt(fault, member.line))?,
                    other => {
                        return Err(RuntimeFault::NotAnInstance {
                            type_name: other.type_name(),
                            member: member.content.clone(),
                            line: member.line,
                        }
                        .into());
                    }
                }
            }
            other => {
                return Err(RuntimeFault::TypeMismatch {
                    operator: "=".to_string(),
                    left: "expression",
                    right: value.type_name(),
                    line: other.line(),
                }
                .into());
            }
        }
        Ok(value)
    }

    fn store(
        &mut self,
        frame: &mut Frame,
        slot: Slot,
        name: &Token,
        value: Value,
    ) -> Result<(), RuntimeFault> {
        let member = self
            .slot_mut(frame, slot)
            .ok_or_else(|| RuntimeFault::UndefinedVariable {
                name: name.content.clone(),
                line: name.line,
            })?;
        if member.constant {
            return Err(RuntimeFault::AssignToConstant {
                name: name.content.clone(),
                line: name.line,
            });
        }
        member.value = value;
        Ok(())
    }

    fn get_member(&mut self, receiver: &Value, member: &Token) -> Result<Value, Interrupt> {
        match receiver {
            Value::Object(id) => self
                .field_slot(*id, &member.content)
                .and_then(|(owner, index)| self.heap.get(owner.0)?.slots.get(index))
                .map(|slot| slot.value.clone())
                .ok_or_else(|| {
                    RuntimeFault::MissingMember {
                        type_name: self.class_name(*id),
                        member: member.content.clone(),
                        line: member.line,
                    }
                    .into()
                }),
            Value::Host(handle) => self
                .host
                .get_field(*handle, &member.content)
                .map_err(|fault| host_interrupt(fault, member.line)),
            other => Err(RuntimeFault::NotAnInstance {
                type_name: other.type_name(),
                member: member.content.clone(),
                line: member.line,
            }
            .into()),
        }
    }

    // -----------------------------------------------------------------
    // Calls and construction
    // -----------------------------------------------------------------

    fn call(
        &mut self,
        frame: &mut Frame,
        callee: &'a Expr,
        name: &'a Token,
        args: &'a [Expr],
    ) -> Result<Value, Interrupt> {
        match callee {
            Expr::MemberAccess { target, .. } => {
                let receiver = self.receiver(frame, target)?;
                let args = self.evaluate_args(frame, args)?;
                self.call_method(receiver, name, args)
            }
            _ => {
                let args = self.evaluate_args(frame, args)?;
                self.call_named(frame, name, args)
            }
        }
    }

    /// `receiver.name(args)`; script methods are searched up the `super` chain.
    fn call_method(
        &mut self,
        receiver: Value,
        name: &Token,
        args: Vec<Value>,
    ) -> Result<Value, Interrupt> {
        let line = name.line;
        match receiver {
            Value::Object(id) => {
                let Some((owner, function)) = self.find_method(id, &name.content, args.len())
                else {
                    return Err(RuntimeFault::MissingMember {
                        type_name: self.class_name(id),
                        member: name.content.clone(),
                        line,
                    }
                    .into());
                };
                self.invoke(function, Some(owner), args)
            }
            Value::Host(handle) => self
                .host
                .invoke(HostReceiver::Value(handle), &name.content, args)
                .map_err(|fault| host_interrupt(fault, line)),
            Value::HostType(handle) => self
                .host
                .invoke(HostReceiver::Type(handle), &name.content, args)
                .map_err(|fault| host_interrupt(fault, line)),
            other => Err(RuntimeFault::NotAnInstance {
                type_name: other.type_name(),
                member: name.content.clone(),
                line,
            }
            .into()),
        }
    }

    /// Bare `name(args)`: methods of the bound instance, file functions,
    /// class constructors, system functions, then host constructors.
    fn call_named(
        &mut self,
        frame: &mut Frame,
        name: &Token,
        args: Vec<Value>,
    ) -> Result<Value, Interrupt> {
        let program = self.program;
        let callee = name.content.as_str();
        let arity = args.len();

        if let Some(instance) = frame.instance {
            if let Some((owner, function)) = self.find_method(instance, callee, arity) {
                return self.invoke(function, Some(owner), args);
            }
        }
        if let Some(function) = program.function(callee, arity) {
            return self.invoke(function, None, args);
        }
        if let Some(ty) = program.type_id(callee) {
            return self.construct(ty, args, name.line);
        }
        if let Some(system) = find_system_function(callee, arity) {
            self.call_system(system.kind, &args);
            return Ok(Value::Void);
        }
        if self.is_host_type(frame.file, callee) {
            let handle = self.host_type(frame.file, name)?;
            return self
                .host
                .construct(handle, args)
                .map_err(|fault| host_interrupt(fault, name.line));
        }
        Err(RuntimeFault::UndefinedFunction {
            name: callee.to_string(),
            arity,
            line: name.line,
        }
        .into())
    }

    fn call_system(&mut self, kind: SystemFunctionKind, args: &[Value]) {
        let mut text = args.first().map(|value| self.render(value)).unwrap_or_default();
        if kind == SystemFunctionKind::PrintLine {
            text.push('\n');
        }
        self.console.write(&text);
    }

    /// Run a function with positionally bound parameters.
    fn invoke(
        &mut self,
        function: &'a FunctionMember,
        instance: Option<InstanceId>,
        args: Vec<Value>,
    ) -> Result<Value, Interrupt> {
        trace!(function = %function.decl.key(), "call");
        let mut frame = Frame::new(function.file, instance);
        let mut scope = Scope::default();
        for (param, value) in function.decl.params().iter().zip(args) {
            if let StatementKind::VarDecl { name, constant, .. } = &param.kind {
                scope.declare(VariableMember::new(name.content.clone(), *constant, value));
            }
        }
        frame.scopes.push(scope);

        let caller = self.current_file;
        self.current_file = function.file;
        let flow = self.exec_statements(&mut frame, function.decl.statements())?;
        self.current_file = caller;

        let line = function.decl.name.line;
        match flow {
            Flow::Normal => Ok(Value::Void),
            Flow::Return(value) => Ok(value),
            Flow::Thrown(thrown) => Err(Interrupt::Throw(thrown)),
            Flow::Break => Err(RuntimeFault::StrayControlFlow {
                keyword: "break",
                line,
            }
            .into()),
            Flow::Continue => Err(RuntimeFault::StrayControlFlow {
                keyword: "continue",
                line,
            }
            .into()),
        }
    }

    fn construct(&mut self, ty: TypeId, args: Vec<Value>, line: usize) -> Result<Value, Interrupt> {
        let program = self.program;
        let def = program.type_def(ty);
        let arity = args.len();
        let constructor = def.constructor(arity);
        if constructor.is_none() && !(arity == 0 && def.has_default_constructor()) {
            return Err(RuntimeFault::UndefinedFunction {
                name: def.name.clone(),
                arity,
                line,
            }
            .into());
        }

        let id = self.instantiate(ty)?;
        if let Some(constructor) = constructor {
            self.invoke(constructor, Some(id), args)?;
        }
        Ok(Value::Object(id))
    }

    /// Allocate an instance with fresh slots and run its field initializers.
    /// A parent part is built first, with its zero-argument constructor if
    /// it declares one.
    fn instantiate(&mut self, ty: TypeId) -> Result<InstanceId, Interrupt> {
        let program = self.program;
        let def = program.type_def(ty);

        let parent = match def.parent {
            Some(parent_ty) => {
                let parent_id = self.instantiate(parent_ty)?;
                if let Some(constructor) = program.type_def(parent_ty).constructor(0) {
                    self.invoke(constructor, Some(parent_id), Vec::new())?;
                }
                Some(parent_id)
            }
            None => None,
        };

        let id = InstanceId(self.heap.len());
        let mut slots = Scope::default();
        slots.declare(VariableMember::new("this", true, Value::Object(id)));
        if let Some(parent) = parent {
            slots.declare(VariableMember::new("super", true, Value::Object(parent)));
        }
        for field in &def.fields {
            slots.declare(VariableMember::new(
                field.name.content.clone(),
                field.constant,
                Value::Void,
            ));
        }
        self.heap.push(Instance { ty, slots });

        let caller = self.current_file;
        self.current_file = def.file;
        let initialized = self.initialize_fields(id, def);
        // Faults end the run and stay attributed to the file raising them.
        if !matches!(initialized, Err(Interrupt::Fault(_))) {
            self.current_file = caller;
        }
        initialized?;

        trace!(class = %def.name, id = id.0, "instantiated");
        Ok(id)
    }

    fn initialize_fields(
        &mut self,
        id: InstanceId,
        def: &'a TypeDefinition,
    ) -> Result<(), Interrupt> {
        let mut frame = Frame::new(def.file, Some(id));
        for field in &def.fields {
            let Some(init) = &field.init else {
                continue;
            };
            frame.stack.clear();
            let value = self.evaluate(&mut frame, init)?;
            let slot = self.heap.get_mut(id.0).and_then(|instance| {
                let index = instance.slots.position(&field.name.content)?;
                instance.slots.get_mut(index)
            });
            if let Some(slot) = slot {
                slot.value = value;
            }
        }
        Ok(())
    }

    fn find_method(
        &self,
        start: InstanceId,
        name: &str,
        arity: usize,
    ) -> Option<(InstanceId, &'a FunctionMember)> {
        let program = self.program;
        let mut current = Some(start);
        while let Some(id) = current {
            let instance = self.heap.get(id.0)?;
            if let Some(function) = program.type_def(instance.ty).method(name, arity) {
                return Some((id, function));
            }
            current = self.parent_of(id);
        }
        None
    }

    // -----------------------------------------------------------------
    // Slots
    // -----------------------------------------------------------------

    fn locate(&self, frame: &Frame, name: &str) -> Option<Slot> {
        for (depth, scope) in frame.scopes.iter().enumerate().rev() {
            if let Some(index) = scope.position(name) {
                return Some(Slot::Local(depth, index));
            }
        }
        if let Some(instance) = frame.instance {
            if let Some((owner, index)) = self.field_slot(instance, name) {
                return Some(Slot::Field(owner, index));
            }
        }
        self.globals
            .get(frame.file)?
            .position(name)
            .map(|index| Slot::Global(frame.file, index))
    }

    /// Field `name` on `start` or the nearest `super` part declaring it.
    fn field_slot(&self, start: InstanceId, name: &str) -> Option<(InstanceId, usize)> {
        let mut current = Some(start);
        while let Some(id) = current {
            if let Some(index) = self.heap.get(id.0)?.slots.position(name) {
                return Some((id, index));
            }
            current = self.parent_of(id);
        }
        None
    }

    fn parent_of(&self, id: InstanceId) -> Option<InstanceId> {
        match self.heap.get(id.0)?.slots.lookup("super") {
            Some(VariableMember {
                value: Value::Object(parent),
                ..
            }) => Some(*parent),
            _ => None,
        }
    }

    fn slot_ref<'f>(&'f self, frame: &'f Frame, slot: Slot) -> Option<&'f VariableMember> {
        match slot {
            Slot::Local(depth, index) => frame.scopes.get(depth)?.get(index),
            Slot::Field(id, index) => self.heap.get(id.0)?.slots.get(index),
            Slot::Global(file, index) => self.globals.get(file)?.get(index),
        }
    }

    fn slot_mut<'f>(
        &'f mut self,
        frame: &'f mut Frame,
        slot: Slot,
    ) -> Option<&'f mut VariableMember> {
        match slot {
            Slot::Local(depth, index) => frame.scopes.get_mut(depth)?.get_mut(index),
            Slot::Field(id, index) => self.heap.get_mut(id.0)?.slots.get_mut(index),
            Slot::Global(file, index) => self.globals.get_mut(file)?.get_mut(index),
        }
    }

    fn class_name(&self, id: InstanceId) -> String {
        self.heap
            .get(id.0)
            .map(|instance| self.program.type_def(instance.ty).name.clone())
            .unwrap_or_else(|| "object".to_string())
    }

    // -----------------------------------------------------------------
    // Host types
    // -----------------------------------------------------------------

    fn is_host_type(&self, file: usize, name: &str) -> bool {
        self.builtin_types.contains(name)
            || self
                .program
                .files
                .get(file)
                .is_some_and(|file| file.imports.contains_key(name))
    }

    /// Resolve through the file's imports, memoized per run.
    fn host_type(&mut self, file: usize, name: &Token) -> Result<TypeHandle, RuntimeFault> {
        let qualified = self
            .program
            .files
            .get(file)
            .and_then(|file| file.imports.get(&name.content))
            .cloned()
            .unwrap_or_else(|| name.content.clone());
        if let Some(handle) = self.resolved_types.get(&qualified) {
            return Ok(*handle);
        }
        let handle = self
            .host
            .resolve_type(&qualified)
            .ok_or_else(|| RuntimeFault::UnresolvedHostType {
                name: qualified.clone(),
                line: name.line,
            })?;
        debug!(host_type = %qualified, "resolved host type");
        self.resolved_types.insert(qualified, handle);
        Ok(handle)
    }
}

fn is_catch(statement: &Statement) -> bool {
    matches!(
        statement.kind,
        StatementKind::Block {
            kind: BlockKind::Catch { .. },
            ..
        }
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::FileDecl;
    use crate::host::{HostValue, NoHost};
    use crate::lexer::tokenize;
    use crate::parser::parse_file;
    use crate::verifier::verify_program;

    fn load(sources: &[&str], host: &dyn HostBridge) -> Program {
        let files: Vec<FileDecl> = sources
            .iter()
            .enumerate()
            .map(|(index, source)| {
                parse_file(&format!("file{index}.w"), tokenize(source).expect("tokenize"))
                    .expect("parse")
            })
            .collect();
        verify_program(&files, host).expect("verify");
        Program::build(files)
    }

    fn run(source: &str) -> (Result<(), CoreError>, String) {
        let program = load(&[source], &NoHost);
        let mut host = NoHost;
        let mut out = String::new();
        let result = Interpreter::new(&program, &mut host, &mut out).initialize();
        (result, out)
    }

    fn output(source: &str) -> String {
        let (result, out) = run(source);
        result.expect("run");
        out
    }

    fn fault(source: &str) -> RuntimeFault {
        match run(source).0 {
            Err(CoreError::Runtime { source, .. }) => source,
            other => panic!("expected a runtime fault, got {other:?}"),
        }
    }

    #[test]
    fn runs_the_add_program() {
        let source = "function add(a, b) { return a + b; }\nlet r = add(2, 3);\nprintln(r);\n";
        assert_eq!(output(source), "5\n");
    }

    #[test]
    fn self_reference_reads_the_void_slot() {
        assert_eq!(output("let s = s + \"x\";\nprintln(s);"), "nullx\n");
        assert_eq!(
            fault("let a = a + 1;\nprintln(a);"),
            RuntimeFault::TypeMismatch {
                operator: "+".to_string(),
                left: "void",
                right: "int",
                line: 1,
            }
        );
    }

    #[test]
    fn promotes_and_concatenates() {
        let source = "println(1 + 2.0);\nprintln(\"a\" + 1);\nprintln(1 + \"a\");\nprintln(7 / 2);";
        assert_eq!(output(source), "3.0\na1\n1a\n3\n");
    }

    #[test]
    fn boolean_operators_evaluate_both_sides() {
        let source = "let count = 0;\n\
                      function touch() { count = count + 1; return true; }\n\
                      let r = false && touch();\n\
                      println(count);\n\
                      println(r);";
        assert_eq!(output(source), "1\nfalse\n");
    }

    #[test]
    fn equality_compares_values() {
        let source = "println(true == true);\nprintln(1 == 1.0);\nprintln(\"a\" != \"b\");";
        assert_eq!(output(source), "true\ntrue\ntrue\n");
    }

    #[test]
    fn default_constructor_initializes_fields() {
        let source = "class Point { let x = 3; let y = x + 1; let z; }\n\
                      let p = Point();\n\
                      println(p.x);\n\
                      println(p.y);\n\
                      println(p.z);\n\
                      println(p);";
        assert_eq!(output(source), "3\n4\nnull\n<Point#0>\n");
    }

    #[test]
    fn constructors_and_methods_share_fields() {
        let source = "class Counter {\n\
                        let count = 0;\n\
                        Counter(start) { count = start; }\n\
                        function inc() { count = count + 1; return this; }\n\
                        function get() { return count; }\n\
                      }\n\
                      let c = Counter(5);\n\
                      c.inc().inc();\n\
                      println(c.get());";
        assert_eq!(output(source), "7\n");
    }

    #[test]
    fn inherited_members_live_on_the_super_part() {
        let source = "class Base {\n\
                        let size = 1;\n\
                        Base() { size = 10; }\n\
                        function grow() { size = size + 1; return size; }\n\
                      }\n\
                      class Big implements Base {\n\
                        let extra = 2;\n\
                        function total() { grow(); return super.size + extra; }\n\
                      }\n\
                      let b = Big();\n\
                      println(b.total());\n\
                      println(b.grow());";
        assert_eq!(output(source), "13\n12\n");
    }

    #[test]
    fn else_chains_pick_one_branch() {
        let source = "function classify(n) {\n\
                        if (n < 0) { return \"neg\"; } else if (n == 0) { return \"zero\"; } else { return \"pos\"; }\n\
                      }\n\
                      println(classify(-1));\n\
                      println(classify(0));\n\
                      println(classify(5));";
        assert_eq!(output(source), "neg\nzero\npos\n");
    }

    #[test]
    fn taken_branch_suppresses_else_after_nested_if() {
        let source = "function g(a, b) {\n\
                        let r = \"\";\n\
                        if (a) { if (b) { r = \"ab\"; } } else { r = \"none\"; }\n\
                        return r;\n\
                      }\n\
                      println(\"[\" + g(true, false) + \"]\");\n\
                      println(\"[\" + g(false, true) + \"]\");\n\
                      println(\"[\" + g(true, true) + \"]\");";
        assert_eq!(output(source), "[]\n[none]\n[ab]\n");
    }

    #[test]
    fn loops_honor_break_and_continue() {
        let source = "function sum() {\n\
                        let total = 0;\n\
                        let i = 0;\n\
                        while (i < 10) {\n\
                          i++;\n\
                          if (i % 2 == 0) { continue; }\n\
                          if (i > 7) { break; }\n\
                          total = total + i;\n\
                        }\n\
                        return total;\n\
                      }\n\
                      function upto(n) {\n\
                        let s = 0;\n\
                        for (let i = 0; i < n; i++) { s = s + i; }\n\
                        return s;\n\
                      }\n\
                      println(sum());\n\
                      println(upto(5));";
        assert_eq!(output(source), "16\n10\n");
    }

    #[test]
    fn for_loops_run_the_step_after_continue() {
        let source = "function f() {\n\
                        let s = 0;\n\
                        for (let i = 0; i < 5; i++) {\n\
                          if (i == 2) { continue; }\n\
                          if (i == 4) { break; }\n\
                          s = s + i;\n\
                        }\n\
                        return s;\n\
                      }\n\
                      println(f());";
        assert_eq!(output(source), "4\n");
    }

    #[test]
    fn inherited_methods_call_names_on_their_own_part() {
        let source = "class A {\n\
                        function name() { return \"A\"; }\n\
                        function hello() { println(name()); }\n\
                      }\n\
                      class B implements A { function name() { return \"B\"; } }\n\
                      let b = B();\n\
                      b.hello();\n\
                      println(b.name());";
        assert_eq!(output(source), "A\nB\n");
    }

    #[test]
    fn recursion_uses_fresh_frames() {
        let source = "function fib(n) { if (n < 2) { return n; } return fib(n - 1) + fib(n - 2); }\n\
                      println(fib(10));";
        assert_eq!(output(source), "55\n");
    }

    #[test]
    fn catches_by_class_and_qualified_name() {
        let source = "class Oops { let message = \"bad\"; }\n\
                      class Other { }\n\
                      function risky(n) { if (n > 1) { throw Oops(); } return n; }\n\
                      function safe(n) {\n\
                        try { return risky(n); }\n\
                        catch (Other) { return -1; }\n\
                        catch (errors.Oops e) { return e.message; }\n\
                      }\n\
                      println(safe(1));\n\
                      println(safe(5));";
        assert_eq!(output(source), "1\nbad\n");
    }

    #[test]
    fn catches_by_ancestor_class() {
        let source = "class Failure { }\n\
                      class Timeout implements Failure { let seconds = 3; }\n\
                      function wait() { throw Timeout(); }\n\
                      function guarded() { try { wait(); } catch (Failure f) { return f.seconds; } return 0; }\n\
                      println(guarded());";
        assert_eq!(output(source), "3\n");
    }

    #[test]
    fn catches_primitive_throws_by_type_name() {
        let source = "function f() { try { throw 42; } catch (int v) { return v + 1; } return 0; }\n\
                      println(f());";
        assert_eq!(output(source), "43\n");
    }

    #[test]
    fn unmatched_throw_escapes_as_uncaught() {
        let source = "function f() {\n\
                        try { throw 1; } catch (string s) { println(s); }\n\
                      }\n\
                      f();";
        assert_eq!(
            fault(source),
            RuntimeFault::Uncaught {
                type_name: "int".to_string(),
                line: 2,
            }
        );
    }

    #[test]
    fn reports_runtime_faults() {
        assert_eq!(
            fault("function f() { if (1) { } }\nf();"),
            RuntimeFault::ConditionNotBoolean {
                found: "int",
                line: 1
            }
        );
        assert_eq!(fault("let x = 1 / 0;"), RuntimeFault::DivisionByZero { line: 1 });
        assert_eq!(
            fault("let const k = 1;\nfunction f() { k = 2; }\nf();"),
            RuntimeFault::AssignToConstant {
                name: "k".to_string(),
                line: 2,
            }
        );
    }

    #[test]
    fn faults_are_tagged_with_the_running_file() {
        let program = load(&["function boom() { return 1 / 0; }", "let x = boom();"], &NoHost);
        let mut host = NoHost;
        let mut out = String::new();
        let err = Interpreter::new(&program, &mut host, &mut out)
            .initialize()
            .unwrap_err();
        assert!(matches!(
            err,
            CoreError::Runtime { ref file, source: RuntimeFault::DivisionByZero { line: 1 } }
                if file == "file0.w"
        ));
    }

    #[test]
    fn caught_field_initializer_throw_keeps_the_caller_file() {
        let program = load(
            &[
                "class Bad { let x = boom(); }\nfunction boom() { throw 1; }",
                "function main() {\n\
                   try { let b = Bad(); } catch (int e) { }\n\
                   let z = 1 / 0;\n\
                 }",
            ],
            &NoHost,
        );
        let mut host = NoHost;
        let mut out = String::new();
        let mut interpreter = Interpreter::new(&program, &mut host, &mut out);
        interpreter.initialize().expect("initialize");
        let err = interpreter.call_entry(1, "main").unwrap_err();
        assert!(matches!(
            err,
            CoreError::Runtime { ref file, source: RuntimeFault::DivisionByZero { line: 3 } }
                if file == "file1.w"
        ));
    }

    #[test]
    fn files_initialize_in_order_and_share_functions() {
        let program = load(&["function answer() { return 42; }", "let got = answer();"], &NoHost);
        let mut host = NoHost;
        let mut out = String::new();
        let mut interpreter = Interpreter::new(&program, &mut host, &mut out);
        interpreter.initialize().expect("initialize");
        assert_eq!(interpreter.global(1, "got"), Some(&Value::Int(42)));
        assert_eq!(interpreter.global(0, "got"), None);
    }

    #[test]
    fn calls_the_entry_function() {
        let program = load(&["function main() { println(\"hi\"); return 7; }"], &NoHost);
        let mut host = NoHost;
        let mut out = String::new();
        let mut interpreter = Interpreter::new(&program, &mut host, &mut out);
        interpreter.initialize().expect("initialize");
        assert_eq!(interpreter.call_entry(0, "main").expect("main"), Value::Int(7));
        assert!(matches!(
            interpreter.call_entry(0, "start"),
            Err(CoreError::MissingEntry { .. })
        ));
        drop(interpreter);
        assert_eq!(out, "hi\n");
    }

    /// Host exposing `host.util.List`, a growable list of values.
    #[derive(Default)]
    struct ListHost {
        lists: Vec<Vec<Value>>,
    }

    impl ListHost {
        fn list(&mut self, value: HostValue) -> Result<&mut Vec<Value>, HostFault> {
            self.lists
                .get_mut(value.0 as usize)
                .ok_or_else(|| HostFault::Failed("stale list handle".to_string()))
        }
    }

    impl HostBridge for ListHost {
        fn resolve_type(&mut self, qualified_name: &str) -> Option<TypeHandle> {
            (qualified_name == "host.util.List").then_some(TypeHandle(1))
        }

        fn type_name(&self, _value: HostValue) -> String {
            "host.util.List".to_string()
        }

        fn construct(&mut self, _ty: TypeHandle, _args: Vec<Value>) -> Result<Value, HostFault> {
            self.lists.push(Vec::new());
            Ok(Value::Host(HostValue(self.lists.len() as u64 - 1)))
        }

        fn invoke(
            &mut self,
            receiver: HostReceiver,
            member: &str,
            args: Vec<Value>,
        ) -> Result<Value, HostFault> {
            match (receiver, member) {
                (HostReceiver::Value(list), "add") => {
                    self.list(list)?.extend(args);
                    Ok(Value::Void)
                }
                (HostReceiver::Value(list), "get") => {
                    let Some(Value::Int(index)) = args.first().cloned() else {
                        return Err(HostFault::Failed("index must be an int".to_string()));
                    };
                    self.list(list)?
                        .get(index as usize)
                        .cloned()
                        .ok_or(HostFault::Thrown {
                            type_name: "host.util.IndexError".to_string(),
                            value: Value::Int(index),
                        })
                }
                (HostReceiver::Type(ty), "empty") => self.construct(ty, args),
                _ => Err(HostFault::Failed(format!("no member {member}"))),
            }
        }

        fn get_field(&mut self, value: HostValue, name: &str) -> Result<Value, HostFault> {
            match name {
                "size" => Ok(Value::Int(self.list(value)?.len() as i64)),
                _ => Err(HostFault::Failed(format!("no field {name}"))),
            }
        }

        fn set_field(
            &mut self,
            _value: HostValue,
            name: &str,
            _new_value: Value,
        ) -> Result<(), HostFault> {
            Err(HostFault::Failed(format!("{name} is read-only")))
        }
    }

    #[test]
    fn dispatches_to_host_objects() {
        let source = "import host.util.List;\n\
                      function main() {\n\
                        let xs = List();\n\
                        xs.add(4);\n\
                        xs.add(9);\n\
                        println(xs.size);\n\
                        println(xs.get(1));\n\
                        try { xs.get(5); } catch (IndexError missing) { println(\"missing \" + missing); }\n\
                        let ys = List.empty();\n\
                        println(ys.size);\n\
                        println(xs);\n\
                      }";
        let mut host = ListHost::default();
        let program = load(&[source], &host);
        let mut out = String::new();
        let mut interpreter = Interpreter::new(&program, &mut host, &mut out);
        interpreter.initialize().expect("initialize");
        interpreter.call_entry(0, "main").expect("main");
        drop(interpreter);
        assert_eq!(out, "2\n9\nmissing 5\n0\n<host.util.List>\n");
    }

    #[test]
    fn host_failures_are_not_catchable() {
        let source = "import host.util.List;\n\
                      function main() {\n\
                        let xs = List();\n\
                        try { xs.size = 3; } catch (List e) { }\n\
                      }";
        let mut host = ListHost::default();
        let program = load(&[source], &host);
        let mut out = String::new();
        let mut interpreter = Interpreter::new(&program, &mut host, &mut out);
        let err = interpreter.call_entry(0, "main").unwrap_err();
        assert!(matches!(
            err,
            CoreError::Runtime {
                source: RuntimeFault::Host { line: 4, .. },
                ..
            }
        ));
    }
}
