//! Executable program tables built from verified declarations.
//!
//! A [`Program`] is read-only once built; everything that changes while a
//! script runs lives in the interpreter.

use std::collections::HashMap;

use tracing::debug;

use crate::ast::{FileDecl, FunctionDecl, FunctionKey, TopLevel, VariableDecl};
use crate::value::VariableMember;

/// Index of a class in [`Program::types`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TypeId(pub usize);

/// A script function together with the file it was declared in.
#[derive(Debug, Clone)]
pub struct FunctionMember {
    pub decl: FunctionDecl,
    pub file: usize,
}

impl FunctionMember {
    pub fn name(&self) -> &str {
        &self.decl.name.content
    }
}

/// Runtime blueprint of a class, shared by all of its instances.
#[derive(Debug, Clone)]
pub struct TypeDefinition {
    pub name: String,
    pub file: usize,
    /// Field declarations; initializers are evaluated per construction.
    pub fields: Vec<VariableDecl>,
    pub methods: HashMap<FunctionKey, FunctionMember>,
    /// Declared constructors by arity.
    pub constructors: HashMap<usize, FunctionMember>,
    pub parent: Option<TypeId>,
}

impl TypeDefinition {
    pub fn method(&self, name: &str, arity: usize) -> Option<&FunctionMember> {
        self.methods.get(&FunctionKey::new(name, arity))
    }

    pub fn constructor(&self, arity: usize) -> Option<&FunctionMember> {
        self.constructors.get(&arity)
    }

    /// A class without declared constructors gets a zero-argument one.
    pub fn has_default_constructor(&self) -> bool {
        self.constructors.is_empty()
    }
}

/// File-scope state of one source file.
#[derive(Debug, Clone)]
pub struct FileRuntime {
    pub name: String,
    pub variables: Vec<VariableDecl>,
    pub top_level: Vec<TopLevel>,
    /// Visible import name to qualified host type name.
    pub imports: HashMap<String, String>,
}

#[derive(Debug, Clone, Default)]
pub struct Program {
    pub files: Vec<FileRuntime>,
    pub functions: HashMap<FunctionKey, FunctionMember>,
    pub types: Vec<TypeDefinition>,
    type_index: HashMap<String, TypeId>,
}

impl Program {
    /// Lower verified files into executable tables.
    pub fn build(files: Vec<FileDecl>) -> Program {
        let mut program = Program::default();
        let mut parents = Vec::new();

        for (index, file) in files.into_iter().enumerate() {
            for (key, decl) in file.functions {
                program
                    .functions
                    .insert(key, FunctionMember { decl, file: index });
            }

            for class in file.classes {
                let mut methods = HashMap::new();
                let mut constructors = HashMap::new();
                for (key, decl) in class.functions {
                    let member = FunctionMember { decl, file: index };
                    if member.decl.constructor {
                        constructors.insert(key.arity, member);
                    } else {
                        methods.insert(key, member);
                    }
                }
                let id = TypeId(program.types.len());
                program.type_index.insert(class.name.content.clone(), id);
                parents.push(class.parent.map(|parent| parent.content));
                program.types.push(TypeDefinition {
                    name: class.name.content,
                    file: index,
                    fields: class.variables,
                    methods,
                    constructors,
                    parent: None,
                });
            }

            program.files.push(FileRuntime {
                imports: file
                    .imports
                    .iter()
                    .map(|import| (import.visible_name().to_string(), import.qualified_name()))
                    .collect(),
                name: file.name,
                variables: file.variables,
                top_level: file.top_level,
            });
        }

        for (index, parent) in parents.into_iter().enumerate() {
            let resolved = parent.and_then(|name| program.type_id(&name));
            program.types[index].parent = resolved;
        }

        debug!(
            files = program.files.len(),
            functions = program.functions.len(),
            types = program.types.len(),
            "runtime built"
        );
        program
    }

    pub fn type_id(&self, name: &str) -> Option<TypeId> {
        self.type_index.get(name).copied()
    }

    pub fn type_def(&self, id: TypeId) -> &TypeDefinition {
        &self.types[id.0]
    }

    pub fn function(&self, name: &str, arity: usize) -> Option<&FunctionMember> {
        self.functions.get(&FunctionKey::new(name, arity))
    }

    pub fn file_index(&self, name: &str) -> Option<usize> {
        self.files.iter().position(|file| file.name == name)
    }

    /// `id` followed by its ancestors, nearest first.
    pub fn lineage(&self, id: TypeId) -> Vec<TypeId> {
        let mut chain = vec![id];
        let mut current = id;
        while let Some(parent) = self.type_def(current).parent {
            if chain.contains(&parent) {
                break;
            }
            chain.push(parent);
            current = parent;
        }
        chain
    }
}

/// Ordered name-to-slot map. Lookups are linear; scopes stay small.
#[derive(Debug, Clone, Default)]
pub(crate) struct Scope {
    slots: Vec<VariableMember>,
}

impl Scope {
    /// Returns false when `member.name` already exists here.
    pub(crate) fn declare(&mut self, member: VariableMember) -> bool {
        if self.position(&member.name).is_some() {
            return false;
        }
        self.slots.push(member);
        true
    }

    pub(crate) fn position(&self, name: &str) -> Option<usize> {
        self.slots.iter().position(|slot| slot.name == name)
    }

    pub(crate) fn get(&self, index: usize) -> Option<&VariableMember> {
        self.slots.get(index)
    }

    pub(crate) fn get_mut(&mut self, index: usize) -> Option<&mut VariableMember> {
        self.slots.get_mut(index)
    }

    pub(crate) fn lookup(&self, name: &str) -> Option<&VariableMember> {
        self.position(name).and_then(|index| self.get(index))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::tokenize;
    use crate::parser::parse_file;
    use crate::value::Value;

    fn build(sources: &[&str]) -> Program {
        let files = sources
            .iter()
            .enumerate()
            .map(|(index, source)| {
                parse_file(&format!("file{index}.w"), tokenize(source).expect("tokenize"))
                    .expect("parse")
            })
            .collect();
        Program::build(files)
    }

    #[test]
    fn lowers_functions_with_their_file() {
        let program = build(&["let a = 1;", "function f(x) { return x; }"]);
        let f = program.function("f", 1).expect("f");
        assert_eq!(f.file, 1);
        assert_eq!(f.name(), "f");
        assert_eq!(program.file_index("file1.w"), Some(1));
        assert_eq!(program.files[0].variables.len(), 1);
    }

    #[test]
    fn splits_constructors_from_methods() {
        let program = build(&["class P { let x = 1; P(v) { x = v; } function get() { return x; } }"]);
        let id = program.type_id("P").expect("P");
        let def = program.type_def(id);
        assert!(def.constructor(1).is_some());
        assert!(def.method("get", 0).is_some());
        assert!(def.method("P", 1).is_none());
        assert!(!def.has_default_constructor());
        assert_eq!(def.fields.len(), 1);
    }

    #[test]
    fn resolves_parents_across_files() {
        let program = build(&[
            "class Child implements Base { }",
            "class Base implements Root { } class Root { }",
        ]);
        let child = program.type_id("Child").expect("Child");
        let names: Vec<_> = program
            .lineage(child)
            .into_iter()
            .map(|id| program.type_def(id).name.clone())
            .collect();
        assert_eq!(names, ["Child", "Base", "Root"]);
        assert!(program.type_def(child).has_default_constructor());
    }

    #[test]
    fn records_imports_by_visible_name() {
        let program = build(&["import host.util.List as L; import host.Map;"]);
        let imports = &program.files[0].imports;
        assert_eq!(imports.get("L").map(String::as_str), Some("host.util.List"));
        assert_eq!(imports.get("Map").map(String::as_str), Some("host.Map"));
    }

    #[test]
    fn scope_rejects_redeclaration() {
        let mut scope = Scope::default();
        assert!(scope.declare(VariableMember::new("a", false, Value::Int(1))));
        assert!(!scope.declare(VariableMember::new("a", true, Value::Void)));
        assert_eq!(scope.lookup("a").map(|slot| &slot.value), Some(&Value::Int(1)));
    }
}
