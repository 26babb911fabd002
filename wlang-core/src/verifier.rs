//! Pre-execution symbol and control-placement verification.
//!
//! Runs over every parsed file after all of them have been parsed: the
//! global table is seeded from all files first, then each file's bodies are
//! checked against clones of it. The first violation aborts verification.

use std::collections::HashMap;

use tracing::debug;

use crate::ast::{
    BlockKind, ClassDecl, Expr, FileDecl, FunctionDecl, FunctionKey, Statement, StatementKind,
    TopLevel,
};
use crate::builtins::SYSTEM_FUNCTIONS;
use crate::error::{CoreError, SemanticError};
use crate::host::HostBridge;
use crate::lexer::Token;
use crate::symbols::SymbolTable;

/// Verify a whole program. Succeeds without side effects or fails on the
/// first violation, tagged with the file it was found in.
pub fn verify_program(files: &[FileDecl], host: &dyn HostBridge) -> Result<(), CoreError> {
    let (globals, classes) = seed_globals(files, host)?;
    let verifier = Verifier { classes };

    for file in files {
        verifier
            .verify_file(file, &globals)
            .map_err(|source| semantic(file, source))?;
    }
    debug!(files = files.len(), "verification finished");
    Ok(())
}

fn semantic(file: &FileDecl, source: SemanticError) -> CoreError {
    CoreError::Semantic {
        file: file.name.clone(),
        source,
    }
}

/// Functions in source order, for deterministic error reporting.
fn ordered_functions<'a>(
    functions: &'a HashMap<FunctionKey, FunctionDecl>,
) -> Vec<&'a FunctionDecl> {
    let mut ordered: Vec<_> = functions.values().collect();
    ordered.sort_by_key(|function| (function.name.line, function.arity));
    ordered
}

/// Seed the table shared by every file: host types, constructors, system
/// functions, file functions and classes. Cross-file duplicates and bad
/// parents are rejected here.
fn seed_globals<'a>(
    files: &'a [FileDecl],
    host: &dyn HostBridge,
) -> Result<(SymbolTable, HashMap<&'a str, &'a ClassDecl>), CoreError> {
    let mut table = SymbolTable::default();
    for name in host.builtin_types() {
        table.declare_host_type(&name);
    }

    let mut function_owners: HashMap<&FunctionKey, &str> = HashMap::new();
    for file in files {
        let mut entries: Vec<_> = file.functions.iter().collect();
        entries.sort_by_key(|(_, function)| (function.name.line, function.arity));
        for (key, function) in entries {
            if function_owners.insert(key, file.name.as_str()).is_some() {
                return Err(semantic(
                    file,
                    SemanticError::DuplicateAcrossFiles {
                        name: key.to_string(),
                        line: function.name.line,
                    },
                ));
            }
        }
    }

    let mut classes: HashMap<&str, &ClassDecl> = HashMap::new();
    for file in files {
        for class in &file.classes {
            let name = class.name.content.as_str();
            let clashes_with_function = function_owners.keys().any(|key| key.name == name);
            if classes.insert(name, class).is_some() || clashes_with_function {
                return Err(semantic(
                    file,
                    SemanticError::DuplicateAcrossFiles {
                        name: name.to_string(),
                        line: class.name.line,
                    },
                ));
            }
        }
    }

    for file in files {
        for class in &file.classes {
            check_lineage(class, &classes).map_err(|source| semantic(file, source))?;
        }
    }

    for class in classes.values() {
        let mut has_constructor = false;
        for constructor in class.constructors() {
            table.declare_function(constructor.key());
            has_constructor = true;
        }
        if !has_constructor {
            table.declare_function(FunctionKey::new(class.name.content.clone(), 0));
        }
    }
    for system in SYSTEM_FUNCTIONS {
        table.declare_system_function(system.key());
    }
    for key in function_owners.keys() {
        table.declare_function((*key).clone());
    }

    debug!(classes = classes.len(), functions = function_owners.len(), "verifier seeded");
    Ok((table, classes))
}

/// The parent chain must end at a known class without revisiting `class`.
fn check_lineage(
    class: &ClassDecl,
    classes: &HashMap<&str, &ClassDecl>,
) -> Result<(), SemanticError> {
    let mut current = class;
    let mut steps = 0;
    while let Some(parent) = &current.parent {
        let Some(&next) = classes.get(parent.content.as_str()) else {
            return Err(SemanticError::UnresolvedSymbol {
                name: parent.content.clone(),
                line: parent.line,
            });
        };
        steps += 1;
        if next.name.content == class.name.content || steps > classes.len() {
            return Err(SemanticError::InheritanceCycle {
                name: class.name.content.clone(),
                line: class.name.line,
            });
        }
        current = next;
    }
    Ok(())
}

#[derive(Debug, Clone, Copy)]
struct Context<'a> {
    class: Option<&'a ClassDecl>,
    in_loop: bool,
}

/// What immediately precedes an identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Access {
    Plain,
    /// Left of a `.`; host type names are allowed here.
    Member,
}

struct Verifier<'a> {
    classes: HashMap<&'a str, &'a ClassDecl>,
}

impl<'a> Verifier<'a> {
    fn verify_file(&self, file: &'a FileDecl, globals: &SymbolTable) -> Result<(), SemanticError> {
        let mut table = globals.scoped();
        for import in &file.imports {
            table.declare_host_type(import.visible_name());
        }

        let file_context = Context {
            class: None,
            in_loop: false,
        };
        for item in &file.top_level {
            match item {
                TopLevel::Variable(index) => {
                    let decl = &file.variables[*index];
                    // Declared before its initializer so self-reference resolves.
                    table.declare_variable(&decl.name.content);
                    if let Some(init) = &decl.init {
                        self.visit_expr(init, &table, file_context)?;
                    }
                }
                TopLevel::Statement(statement) => {
                    self.verify_statements(std::slice::from_ref(statement), &mut table, file_context)?;
                }
            }
        }

        for function in ordered_functions(&file.functions) {
            self.verify_function(function, &table, file_context)?;
        }

        for class in &file.classes {
            let context = Context {
                class: Some(class),
                in_loop: false,
            };
            let class_table = table.scoped();
            for variable in &class.variables {
                if let Some(init) = &variable.init {
                    self.visit_expr(init, &class_table, context)?;
                }
            }
            for function in ordered_functions(&class.functions) {
                self.verify_function(function, &class_table, context)?;
            }
        }
        Ok(())
    }

    fn verify_function(
        &self,
        function: &'a FunctionDecl,
        table: &SymbolTable,
        context: Context<'a>,
    ) -> Result<(), SemanticError> {
        let mut scope = table.scoped();
        for param in function.params() {
            if let StatementKind::VarDecl { name, .. } = &param.kind {
                scope.declare_variable(&name.content);
            }
        }
        let context = Context {
            in_loop: false,
            ..context
        };
        self.verify_statements(function.statements(), &mut scope, context)
    }

    fn verify_statements(
        &self,
        statements: &'a [Statement],
        table: &mut SymbolTable,
        context: Context<'a>,
    ) -> Result<(), SemanticError> {
        let mut previous_if = false;
        let mut pending_try: Option<usize> = None;
        let mut catch_open = false;

        for statement in statements {
            let (is_try, is_catch, is_if) = match &statement.kind {
                StatementKind::Block { kind, .. } => (
                    matches!(kind, BlockKind::Try),
                    matches!(kind, BlockKind::Catch { .. }),
                    matches!(kind, BlockKind::If { condition: Some(_), .. }),
                ),
                _ => (false, false, false),
            };
            if let Some(line) = pending_try {
                if !is_catch {
                    return Err(SemanticError::TryWithoutCatch { line });
                }
            }

            match &statement.kind {
                StatementKind::Expression(expr) | StatementKind::Throw(expr) => {
                    self.visit_expr(expr, table, context)?;
                }
                StatementKind::VarDecl { name, init, .. } => {
                    if !table.declare_variable(&name.content) {
                        return Err(SemanticError::DuplicateVariable {
                            name: name.content.clone(),
                            line: name.line,
                        });
                    }
                    if let Some(init) = init {
                        self.visit_expr(init, table, context)?;
                    }
                }
                StatementKind::Return(value) => {
                    if let Some(value) = value {
                        self.visit_expr(value, table, context)?;
                    }
                }
                StatementKind::Break | StatementKind::Continue => {
                    if !context.in_loop {
                        let keyword = if matches!(statement.kind, StatementKind::Break) {
                            "break"
                        } else {
                            "continue"
                        };
                        return Err(SemanticError::OutsideLoop {
                            keyword,
                            line: statement.line,
                        });
                    }
                }
                StatementKind::Block { kind, body } => {
                    match kind {
                        BlockKind::If {
                            else_chain: true, ..
                        } if !previous_if => {
                            return Err(SemanticError::InvalidElse {
                                line: statement.line,
                            });
                        }
                        BlockKind::Catch { .. } if !catch_open => {
                            return Err(SemanticError::CatchWithoutTry {
                                line: statement.line,
                            });
                        }
                        _ => {}
                    }
                    self.verify_block(kind, body, table, context)?;
                }
            }

            previous_if = is_if;
            pending_try = is_try.then_some(statement.line);
            catch_open = is_try || is_catch;
        }

        match pending_try {
            Some(line) => Err(SemanticError::TryWithoutCatch { line }),
            None => Ok(()),
        }
    }

    fn verify_block(
        &self,
        kind: &'a BlockKind,
        body: &'a [Statement],
        table: &SymbolTable,
        context: Context<'a>,
    ) -> Result<(), SemanticError> {
        let mut scope = table.scoped();
        let mut inner = context;
        match kind {
            BlockKind::If { condition, .. } => {
                if let Some(condition) = condition {
                    self.visit_expr(condition, table, context)?;
                }
            }
            BlockKind::While { condition } => {
                self.visit_expr(condition, table, context)?;
                inner.in_loop = true;
            }
            BlockKind::For { init, check, step } => {
                if let Some(init) = init {
                    self.verify_statements(std::slice::from_ref(&**init), &mut scope, context)?;
                }
                for expr in [check, step].into_iter().flatten() {
                    self.visit_expr(expr, &scope, context)?;
                }
                inner.in_loop = true;
                let mut body_scope = scope.scoped();
                return self.verify_statements(body, &mut body_scope, inner);
            }
            BlockKind::Catch { binding, .. } => {
                if let Some(binding) = binding {
                    scope.declare_variable(binding);
                }
            }
            BlockKind::Try | BlockKind::General => {}
        }
        self.verify_statements(body, &mut scope, inner)
    }

    fn visit_expr(
        &self,
        expr: &Expr,
        table: &SymbolTable,
        context: Context<'a>,
    ) -> Result<(), SemanticError> {
        match expr {
            Expr::Constant(_) | Expr::Literal(_) => Ok(()),
            Expr::Identifier(token) => self.resolve_identifier(token, table, context, Access::Plain),
            Expr::Unary { operand, .. } => self.visit_expr(operand, table, context),
            Expr::Binary { left, right, .. } => {
                self.visit_expr(left, table, context)?;
                self.visit_expr(right, table, context)
            }
            Expr::MemberAccess { target, .. } => self.visit_member_target(target, table, context),
            Expr::Call { callee, name, args } => {
                for arg in args {
                    self.visit_expr(arg, table, context)?;
                }
                match callee.as_ref() {
                    Expr::MemberAccess { target, .. } => {
                        self.visit_member_target(target, table, context)
                    }
                    _ => self.resolve_call(name, args.len(), table, context),
                }
            }
        }
    }

    /// Members themselves are only known at runtime; only the target is checked.
    fn visit_member_target(
        &self,
        target: &Expr,
        table: &SymbolTable,
        context: Context<'a>,
    ) -> Result<(), SemanticError> {
        match target {
            Expr::Constant(_) | Expr::Literal(_) => Err(SemanticError::MemberOnConstant {
                line: target.line(),
            }),
            Expr::Identifier(token) => {
                self.resolve_identifier(token, table, context, Access::Member)
            }
            other => self.visit_expr(other, table, context),
        }
    }

    fn resolve_identifier(
        &self,
        token: &Token,
        table: &SymbolTable,
        context: Context<'a>,
        access: Access,
    ) -> Result<(), SemanticError> {
        let name = token.content.as_str();
        if table.has_variable(name) {
            return Ok(());
        }
        if access == Access::Member && table.has_host_type(name) {
            return Ok(());
        }
        if let Some(class) = context.class {
            let resolves = match name {
                "this" => true,
                "super" => class.parent.is_some(),
                _ => self.lineage(class).iter().any(|c| c.has_member(name)),
            };
            if resolves {
                return Ok(());
            }
        }
        Err(SemanticError::UnresolvedSymbol {
            name: name.to_string(),
            line: token.line,
        })
    }

    fn resolve_call(
        &self,
        name: &Token,
        arity: usize,
        table: &SymbolTable,
        context: Context<'a>,
    ) -> Result<(), SemanticError> {
        let callee = name.content.as_str();
        if table.has_function(callee, arity) || table.has_host_type(callee) {
            return Ok(());
        }
        let is_method = context.class.is_some_and(|class| {
            self.lineage(class)
                .iter()
                .any(|c| c.has_method(callee, arity))
        });
        if is_method {
            return Ok(());
        }
        Err(SemanticError::UnresolvedFunction {
            name: callee.to_string(),
            arity,
            line: name.line,
        })
    }

    /// `class` followed by its ancestors, nearest first.
    fn lineage(&self, class: &'a ClassDecl) -> Vec<&'a ClassDecl> {
        let mut chain = vec![class];
        let mut current = class;
        while let Some(parent) = current
            .parent
            .as_ref()
            .and_then(|parent| self.classes.get(parent.content.as_str()).copied())
        {
            if chain.iter().any(|seen| seen.name.content == parent.name.content) {
                break;
            }
            chain.push(parent);
            current = parent;
        }
        chain
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{HostFault, HostReceiver, HostValue, NoHost, TypeHandle};
    use crate::lexer::tokenize;
    use crate::parser::parse_file;
    use crate::value::Value;

    fn parse_all(sources: &[&str]) -> Vec<FileDecl> {
        sources
            .iter()
            .enumerate()
            .map(|(index, source)| {
                parse_file(&format!("file{index}.w"), tokenize(source).expect("tokenize"))
                    .expect("parse")
            })
            .collect()
    }

    fn verify(sources: &[&str]) -> Result<(), CoreError> {
        verify_program(&parse_all(sources), &NoHost)
    }

    fn semantic_error(sources: &[&str]) -> SemanticError {
        match verify(sources) {
            Err(CoreError::Semantic { source, .. }) => source,
            other => panic!("expected semantic error, got {other:?}"),
        }
    }

    #[test]
    fn accepts_self_referencing_global() {
        verify(&["let a = a + 1;\nprintln(a);"]).expect("self reference verifies");
    }

    #[test]
    fn accepts_add_program() {
        verify(&["function add(a, b){ return a + b; } let r = add(2, 3); println(r);"])
            .expect("verifies");
    }

    #[test]
    fn rejects_else_without_if() {
        let err = semantic_error(&["function f() {\n  let x = 1;\n  else { x = 2; }\n}"]);
        assert_eq!(err, SemanticError::InvalidElse { line: 3 });
    }

    #[test]
    fn rejects_else_after_bare_else() {
        let err = semantic_error(&[
            "function f(a) {\n if (a < 1) { }\n else { }\n else { }\n}",
        ]);
        assert_eq!(err, SemanticError::InvalidElse { line: 4 });
    }

    #[test]
    fn accepts_full_else_chain() {
        verify(&["function f(a) { if (a < 1) { } else if (a < 2) { } else { } }"])
            .expect("verifies");
    }

    #[test]
    fn rejects_break_outside_loop() {
        let err = semantic_error(&["function f() {\n  break;\n}"]);
        assert_eq!(
            err,
            SemanticError::OutsideLoop {
                keyword: "break",
                line: 2
            }
        );
        let err = semantic_error(&["function f() {\n  {\n    continue;\n  }\n}"]);
        assert!(matches!(err, SemanticError::OutsideLoop { line: 3, .. }));
        let err = semantic_error(&["function f(a) { if (a < 1) {\n break; } }"]);
        assert!(matches!(err, SemanticError::OutsideLoop { line: 2, .. }));
    }

    #[test]
    fn accepts_break_in_if_inside_loop() {
        verify(&["function f() { let i = 0; while (i < 9) { i++; if (i == 3) { break; } } }"])
            .expect("verifies");
    }

    #[test]
    fn rejects_catch_without_try() {
        let err = semantic_error(&["function f() {\n  catch (E e) { }\n}"]);
        assert_eq!(err, SemanticError::CatchWithoutTry { line: 2 });
    }

    #[test]
    fn rejects_try_without_catch() {
        let err = semantic_error(&["function f() {\n  try { }\n}"]);
        assert_eq!(err, SemanticError::TryWithoutCatch { line: 2 });
        let err = semantic_error(&["function f() {\n  try { }\n  let x = 1;\n}"]);
        assert_eq!(err, SemanticError::TryWithoutCatch { line: 2 });
    }

    #[test]
    fn accepts_try_with_several_catches_and_binding() {
        verify(&["function f() { try { } catch (A a) { println(a); } catch (B) { } }"])
            .expect("verifies");
    }

    #[test]
    fn rejects_unresolved_symbol() {
        let err = semantic_error(&["let a = 1;\nlet b = a + c;"]);
        assert_eq!(
            err,
            SemanticError::UnresolvedSymbol {
                name: "c".to_string(),
                line: 2
            }
        );
    }

    #[test]
    fn calls_need_exact_arity() {
        let err = semantic_error(&["function f(a) { }\nlet x = f(1, 2);"]);
        assert_eq!(
            err,
            SemanticError::UnresolvedFunction {
                name: "f".to_string(),
                arity: 2,
                line: 2
            }
        );
        assert!(verify(&["println(1, 2);"]).is_err());
    }

    #[test]
    fn sibling_functions_do_not_share_locals() {
        let err = semantic_error(&["function f() { let secret = 1; }\nfunction g() { return secret; }"]);
        assert!(matches!(err, SemanticError::UnresolvedSymbol { line: 2, .. }));
    }

    #[test]
    fn rejects_duplicate_local_but_allows_shadowing() {
        let err = semantic_error(&["function f(a) {\n  let a = 2;\n}"]);
        assert!(matches!(err, SemanticError::DuplicateVariable { line: 2, .. }));
        verify(&["function f(a) { { let a = 2; } }"]).expect("shadowing verifies");
    }

    #[test]
    fn resolves_class_members_and_this() {
        verify(&[
            "class Counter {\n let count = 0;\n let step = count + 1;\n function inc() { count = count + step; return this.count; }\n function twice() { inc(); return inc(); }\n}",
        ])
        .expect("verifies");
        let err = semantic_error(&["function f() { return this; }"]);
        assert!(matches!(err, SemanticError::UnresolvedSymbol { .. }));
    }

    #[test]
    fn inherited_members_resolve_and_super_needs_parent() {
        verify(&[
            "class Base { let size = 1; function grow() { size = size + 1; } }\nclass Big implements Base { function more() { grow(); return super.size + size; } }",
        ])
        .expect("verifies");
        let err = semantic_error(&["class Lone { function f() { return super.x; } }"]);
        assert!(matches!(err, SemanticError::UnresolvedSymbol { .. }));
    }

    #[test]
    fn rejects_member_access_on_literals() {
        let err = semantic_error(&["let n = \"text\".size();"]);
        assert_eq!(err, SemanticError::MemberOnConstant { line: 1 });
        let err = semantic_error(&["let n = true.x;"]);
        assert_eq!(err, SemanticError::MemberOnConstant { line: 1 });
    }

    #[test]
    fn member_access_on_variables_is_unchecked() {
        verify(&["class P { } let p = P(); let q = p.anything.deeper;"]).expect("verifies");
    }

    #[test]
    fn default_constructor_has_no_parameters() {
        verify(&["class P { let x = 1; }\nlet p = P();"]).expect("verifies");
        let err = semantic_error(&["class P { let x = 1; }\nlet p = P(1);"]);
        assert!(matches!(err, SemanticError::UnresolvedFunction { arity: 1, .. }));
    }

    #[test]
    fn declared_constructor_replaces_default() {
        let err = semantic_error(&["class P { P(v) { } }\nlet p = P();"]);
        assert!(matches!(err, SemanticError::UnresolvedFunction { arity: 0, .. }));
    }

    #[test]
    fn imports_are_member_targets_and_constructors() {
        verify(&["import host.util.List as L;\nlet l = L();\nlet m = L.of(1);"]).expect("verifies");
        let err = semantic_error(&["import host.util.List as L;\nlet l = L;"]);
        assert!(matches!(err, SemanticError::UnresolvedSymbol { line: 2, .. }));
    }

    #[test]
    fn builtin_host_types_need_no_import() {
        struct ListHost;
        impl HostBridge for ListHost {
            fn builtin_types(&self) -> Vec<String> {
                vec!["List".to_string()]
            }
            fn resolve_type(&mut self, _name: &str) -> Option<TypeHandle> {
                None
            }
            fn type_name(&self, _value: HostValue) -> String {
                "List".to_string()
            }
            fn construct(&mut self, _ty: TypeHandle, _args: Vec<Value>) -> Result<Value, HostFault> {
                Ok(Value::Void)
            }
            fn invoke(
                &mut self,
                _receiver: HostReceiver,
                _member: &str,
                _args: Vec<Value>,
            ) -> Result<Value, HostFault> {
                Ok(Value::Void)
            }
            fn get_field(&mut self, _value: HostValue, _name: &str) -> Result<Value, HostFault> {
                Ok(Value::Void)
            }
            fn set_field(
                &mut self,
                _value: HostValue,
                _name: &str,
                _new_value: Value,
            ) -> Result<(), HostFault> {
                Ok(())
            }
        }

        let files = parse_all(&["let l = List();"]);
        verify_program(&files, &ListHost).expect("verifies with builtin");
        assert!(verify_program(&files, &NoHost).is_err());
    }

    #[test]
    fn functions_and_classes_are_visible_across_files() {
        verify(&[
            "let r = helper(2);\nlet s = Shape();",
            "function helper(x) { return x * 2; }\nclass Shape { }",
        ])
        .expect("verifies");
    }

    #[test]
    fn variables_are_private_to_their_file() {
        let result = verify(&["let shared = 1;", "let other = shared;"]);
        match result {
            Err(CoreError::Semantic { file, source }) => {
                assert_eq!(file, "file1.w");
                assert!(matches!(source, SemanticError::UnresolvedSymbol { .. }));
            }
            other => panic!("unexpected result {other:?}"),
        }
    }

    #[test]
    fn rejects_duplicates_across_files() {
        let err = semantic_error(&["function f() { }", "function f() { }"]);
        assert!(matches!(err, SemanticError::DuplicateAcrossFiles { .. }));
        let err = semantic_error(&["class C { }", "class C { }"]);
        assert!(matches!(err, SemanticError::DuplicateAcrossFiles { .. }));
        verify(&["function f() { }", "function f(a) { }"]).expect("different arity is fine");
    }

    #[test]
    fn rejects_inheritance_cycles_and_unknown_parents() {
        let err = semantic_error(&["class A implements B { }\nclass B implements A { }"]);
        assert!(matches!(err, SemanticError::InheritanceCycle { .. }));
        let err = semantic_error(&["class A implements Missing { }"]);
        assert!(matches!(err, SemanticError::UnresolvedSymbol { .. }));
    }

    #[test]
    fn for_init_is_scoped_to_the_loop() {
        verify(&["function f() { for (let i = 0; i < 3; i++) { println(i); } }"]).expect("verifies");
        let err = semantic_error(&["function f() { for (let i = 0; i < 3; i++) { }\n return i; }"]);
        assert!(matches!(err, SemanticError::UnresolvedSymbol { line: 2, .. }));
    }
}
