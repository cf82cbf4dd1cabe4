// In src/analyzer/resolve.rs

use super::TypeEnv;
use super::types::Type;
use crate::ast::{BinaryOperator, Node, NodeKind, SystemFunction, UnaryOperator};

impl Node {
    /// Best-effort static type of the node's value in `env`.
    ///
    /// Never fails: anything that cannot be inferred (unknown names,
    /// statements, ill-typed operands) is `Type::Unknown`, and callers decide
    /// whether that is an error.
    pub fn resolve_type(&self, env: &TypeEnv) -> Type {
        match &self.kind {
            NodeKind::IntLiteral(value) => {
                if i32::try_from(*value).is_ok() {
                    Type::int32()
                } else {
                    Type::integer(64)
                }
            }
            NodeKind::RealLiteral(_) => Type::float64(),
            NodeKind::BoolLiteral(_) => Type::Boolean,
            NodeKind::StringLiteral(_) => Type::String,
            NodeKind::CharLiteral(_) => Type::integer(8),
            NodeKind::NilLiteral => Type::Pointer(None),

            NodeKind::Variable(name) => env.variable_type(name),
            NodeKind::ArrayAccess { array, .. } => match array.resolve_type(env) {
                Type::Array(array) => array.element.clone(),
                // s[i] and p[i] both yield a character.
                Type::String => Type::integer(8),
                Type::Pointer(Some(inner)) => (*inner).clone(),
                _ => Type::Unknown,
            },
            NodeKind::FieldAccess { record, field } => record
                .resolve_type(env)
                .as_record()
                .and_then(|r| r.field_type(field))
                .cloned()
                .unwrap_or(Type::Unknown),
            NodeKind::Dereference(pointer) => {
                pointer.resolve_type(env).pointee().cloned().unwrap_or(Type::Unknown)
            }
            NodeKind::AddressOf(target) => match target.resolve_type(env) {
                Type::Unknown => Type::Pointer(None),
                ty => Type::pointer_to(ty),
            },

            NodeKind::Unary { op, operand } => {
                let ty = operand.resolve_type(env);
                match (op, &ty) {
                    (UnaryOperator::Neg, Type::Integer { .. } | Type::Float { .. }) => ty,
                    (UnaryOperator::Not, Type::Boolean | Type::Integer { .. }) => ty,
                    _ => Type::Unknown,
                }
            }
            NodeKind::Binary { op, lhs, rhs } => {
                binary_result_type(*op, &lhs.resolve_type(env), &rhs.resolve_type(env))
            }
            NodeKind::Comparison { .. } => Type::Boolean,

            NodeKind::Call { name, args } => match env.resolve_call(name, args).0 {
                Some(func) if !func.is_procedure => func.return_type.clone(),
                _ => Type::Unknown,
            },
            NodeKind::SystemCall { function, .. } => match function {
                SystemFunction::Length | SystemFunction::Low | SystemFunction::High => Type::int32(),
                SystemFunction::PChar => Type::pchar(),
                SystemFunction::Printf => Type::int32(),
                _ => Type::Unknown,
            },

            NodeKind::Assignment { .. }
            | NodeKind::Block(_)
            | NodeKind::If { .. }
            | NodeKind::While { .. }
            | NodeKind::For { .. }
            | NodeKind::Repeat { .. }
            | NodeKind::Break
            | NodeKind::Continue => Type::Unknown,
        }
    }

    /// The static type of the node's value where a value of `expected` is
    /// wanted. A one-character quoted literal is a character in a character
    /// context and a string everywhere else.
    pub fn resolve_type_for(&self, expected: &Type, env: &TypeEnv) -> Type {
        if *expected == Type::integer(8) && self.char_value().is_some() {
            return Type::integer(8);
        }
        self.resolve_type(env)
    }
}

/// Operand types of `lhs <op> rhs`, each side read in the context of the
/// other, so `s[1] = 'a'` compares two characters.
pub(crate) fn comparison_operand_types(lhs: &Node, rhs: &Node, env: &TypeEnv) -> (Type, Type) {
    let (l, r) = (lhs.resolve_type(env), rhs.resolve_type(env));
    (lhs.resolve_type_for(&r, env), rhs.resolve_type_for(&l, env))
}

/// The type of `lhs op rhs`, or `Unknown` when the operands do not unify.
///
/// Integers of different widths unify at the wider width; mixing an integer
/// with a float yields the float; `String + String` and `String + Integer`
/// (character append) yield `String`.
pub(crate) fn binary_result_type(op: BinaryOperator, lhs: &Type, rhs: &Type) -> Type {
    use BinaryOperator::*;

    match (op, lhs, rhs) {
        (Add, Type::String, Type::String | Type::Integer { .. }) => Type::String,

        (Divide, l, r) if l.is_numeric() && r.is_numeric() => Type::float64(),

        (And | Or | Xor, Type::Boolean, Type::Boolean) => Type::Boolean,

        (_, Type::Integer { width: l }, Type::Integer { width: r }) => Type::integer((*l).max(*r)),

        (Add | Sub | Mul, l, r) if l.is_numeric() && r.is_numeric() => {
            let width = [l, r]
                .iter()
                .filter_map(|t| match t {
                    Type::Float { width } => Some(*width),
                    _ => None,
                })
                .max()
                .unwrap_or(64);
            Type::Float { width }
        }

        _ => Type::Unknown,
    }
}
