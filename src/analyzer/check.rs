// In src/analyzer/check.rs

use super::resolve::{binary_result_type, comparison_operand_types};
use super::types::Type;
use super::TypeEnv;
use crate::ast::{
    Block, ComparisonOperator, FunctionDefinition, Node, NodeKind, SystemFunction, UnaryOperator, Unit,
    VariableDefinition,
};
use crate::reporter::TypeError;

impl Unit {
    /// Checks unit-level initializers, every routine with a body and then the
    /// main block.
    pub fn type_check(&self) -> Result<(), TypeError> {
        let mut env = TypeEnv::new(self);
        for var in self.symbols.variables() {
            check_variable(var, &mut env)?;
        }
        for function in self.symbols.functions() {
            function.type_check(self)?;
        }
        self.body.type_check(&mut env)
    }
}

impl FunctionDefinition {
    pub fn type_check(&self, unit: &Unit) -> Result<(), TypeError> {
        let Some(body) = &self.body else {
            return Ok(());
        };
        log::trace!("type-checking `{}`", self.signature());
        let mut env = TypeEnv::for_function(unit, self);
        body.type_check(&mut env)
    }
}

impl Block {
    pub fn type_check<'a>(&'a self, env: &mut TypeEnv<'a>) -> Result<(), TypeError> {
        env.enter_block(self);
        let result = check_block_contents(self, env);
        env.exit_block();
        result
    }
}

fn check_block_contents<'a>(block: &'a Block, env: &mut TypeEnv<'a>) -> Result<(), TypeError> {
    for var in &block.variables {
        check_variable(var, env)?;
    }
    for statement in &block.statements {
        statement.type_check(env)?;
    }
    Ok(())
}

fn check_variable<'a>(var: &'a VariableDefinition, env: &mut TypeEnv<'a>) -> Result<(), TypeError> {
    let Some(init) = &var.initializer else {
        return Ok(());
    };
    init.type_check(env)?;
    let source = init.resolve_type_for(&var.ty, env);
    if !source.is_unknown() && !var.ty.accepts(&source) {
        return Err(TypeError::new(
            &init.loc,
            format!(
                "cannot initialize '{}' of type '{}' with a value of type '{}'",
                var.name, var.ty, source
            ),
        ));
    }
    Ok(())
}

fn check_condition<'a>(condition: &'a Node, keyword: &str, env: &mut TypeEnv<'a>) -> Result<(), TypeError> {
    condition.type_check(env)?;
    let ty = condition.resolve_type(env);
    if !ty.is_unknown() && ty != Type::Boolean {
        return Err(TypeError::new(
            &condition.loc,
            format!("condition of '{}' must be of type 'Boolean', found '{}'", keyword, ty),
        ));
    }
    Ok(())
}

fn expect_integer(node: &Node, what: &str, env: &TypeEnv) -> Result<(), TypeError> {
    let ty = node.resolve_type(env);
    if ty.is_unknown() || ty.is_integer() {
        Ok(())
    } else {
        Err(TypeError::new(&node.loc, format!("{} must be an integer, found '{}'", what, ty)))
    }
}

impl Node {
    /// Validates the node and its children. The first mismatch aborts the
    /// check; nodes whose types cannot be inferred are left to the lowering
    /// engine, which reports unresolved names.
    pub fn type_check<'a>(&'a self, env: &mut TypeEnv<'a>) -> Result<(), TypeError> {
        match &self.kind {
            NodeKind::IntLiteral(_)
            | NodeKind::RealLiteral(_)
            | NodeKind::BoolLiteral(_)
            | NodeKind::StringLiteral(_)
            | NodeKind::CharLiteral(_)
            | NodeKind::NilLiteral
            | NodeKind::Variable(_)
            | NodeKind::Break
            | NodeKind::Continue => Ok(()),

            NodeKind::ArrayAccess { array, index } => {
                array.type_check(env)?;
                index.type_check(env)?;
                expect_integer(index, "array index", env)?;
                if let Some(bounds) = array.resolve_type(env).as_array().and_then(|a| a.bounds) {
                    check_constant_index(index, bounds)?;
                }
                Ok(())
            }
            NodeKind::FieldAccess { record, field } => {
                record.type_check(env)?;
                let ty = record.resolve_type(env);
                match ty {
                    Type::Unknown | Type::Record(_) => Ok(()),
                    other => Err(TypeError::new(
                        &self.loc,
                        format!("cannot access field '{}' of a value of type '{}'", field, other),
                    )),
                }
            }
            NodeKind::Dereference(pointer) => {
                pointer.type_check(env)?;
                match pointer.resolve_type(env) {
                    Type::Unknown | Type::Pointer(Some(_)) => Ok(()),
                    other => Err(TypeError::new(
                        &self.loc,
                        format!("cannot dereference a value of type '{}'", other),
                    )),
                }
            }
            NodeKind::AddressOf(target) => {
                target.type_check(env)?;
                if target.is_lvalue() {
                    Ok(())
                } else {
                    Err(TypeError::new(&self.loc, "cannot take the address of a temporary value"))
                }
            }

            NodeKind::Unary { op, operand } => {
                operand.type_check(env)?;
                let ty = operand.resolve_type(env);
                let valid = match op {
                    UnaryOperator::Neg => ty.is_numeric(),
                    UnaryOperator::Not => ty.is_integer() || ty == Type::Boolean,
                };
                if ty.is_unknown() || valid {
                    Ok(())
                } else {
                    let symbol = if *op == UnaryOperator::Neg { "-" } else { "not" };
                    Err(TypeError::new(
                        &self.loc,
                        format!("operator '{}' cannot be applied to a value of type '{}'", symbol, ty),
                    ))
                }
            }
            NodeKind::Binary { op, lhs, rhs } => {
                lhs.type_check(env)?;
                rhs.type_check(env)?;
                let (l, r) = (lhs.resolve_type(env), rhs.resolve_type(env));
                if l.is_unknown() || r.is_unknown() || !binary_result_type(*op, &l, &r).is_unknown() {
                    return Ok(());
                }
                Err(TypeError::new(
                    &self.loc,
                    format!("cannot unify types '{}' and '{}' for operator '{}'", l, r, op.symbol()),
                ))
            }
            NodeKind::Comparison { op, lhs, rhs } => {
                lhs.type_check(env)?;
                rhs.type_check(env)?;
                let (l, r) = comparison_operand_types(lhs, rhs, env);
                let equality = matches!(op, ComparisonOperator::Eq | ComparisonOperator::NotEq);
                let comparable = match (&l, &r) {
                    (Type::Unknown, _) | (_, Type::Unknown) => true,
                    (a, b) if a.is_numeric() && b.is_numeric() => true,
                    (Type::Boolean, Type::Boolean) => equality,
                    (Type::Pointer(_), Type::Pointer(_)) => equality,
                    _ => false,
                };
                if comparable {
                    Ok(())
                } else {
                    Err(TypeError::new(
                        &self.loc,
                        format!("cannot compare values of type '{}' and '{}' with '{}'", l, r, op.symbol()),
                    ))
                }
            }

            NodeKind::Call { name, args } => {
                for arg in args {
                    arg.type_check(env)?;
                }
                check_call_arguments(name, args, env)
            }
            NodeKind::SystemCall { function, args, .. } => {
                for arg in args {
                    arg.type_check(env)?;
                }
                check_system_call(self, *function, args, env)
            }

            NodeKind::Assignment { target, value } => {
                target.type_check(env)?;
                value.type_check(env)?;
                if let NodeKind::Variable(name) = &target.kind {
                    if env.lookup(name).is_some_and(|b| b.is_constant()) {
                        return Err(TypeError::new(&target.loc, format!("cannot assign to constant '{}'", name)));
                    }
                }
                let dst = target.resolve_type(env);
                let src = value.resolve_type_for(&dst, env);
                if dst.is_unknown() || src.is_unknown() || dst.accepts(&src) {
                    Ok(())
                } else {
                    Err(TypeError::new(
                        &self.loc,
                        format!("cannot assign a value of type '{}' to a variable of type '{}'", src, dst),
                    ))
                }
            }
            NodeKind::Block(block) => block.type_check(env),
            NodeKind::If { condition, then_branch, else_branch } => {
                check_condition(condition, "if", env)?;
                then_branch.type_check(env)?;
                match else_branch {
                    Some(branch) => branch.type_check(env),
                    None => Ok(()),
                }
            }
            NodeKind::While { condition, body } => {
                check_condition(condition, "while", env)?;
                body.type_check(env)
            }
            NodeKind::For { variable, start, end, body, .. } => {
                start.type_check(env)?;
                end.type_check(env)?;
                let ty = env.variable_type(variable);
                if !ty.is_unknown() && !ty.is_integer() {
                    return Err(TypeError::new(
                        &self.loc,
                        format!("'for' loop variable '{}' must be an integer, found '{}'", variable, ty),
                    ));
                }
                expect_integer(start, "'for' loop start", env)?;
                expect_integer(end, "'for' loop bound", env)?;
                body.type_check(env)
            }
            NodeKind::Repeat { body, condition } => {
                body.type_check(env)?;
                check_condition(condition, "until", env)
            }
        }
    }
}

/// Rejects a constant index outside the declared `[low, high]` range.
fn check_constant_index(index: &Node, (low, high): (i64, i64)) -> Result<(), TypeError> {
    match index.constant_int() {
        Some(value) if value < low || value > high => Err(TypeError::new(
            &index.loc,
            format!("index {} is out of range for array[{}..{}]", value, low, high),
        )),
        _ => Ok(()),
    }
}

fn check_call_arguments(name: &str, args: &[Node], env: &TypeEnv) -> Result<(), TypeError> {
    // Unresolved names and arity mismatches are reported during lowering.
    let (Some(function), arg_types) = env.resolve_call(name, args) else {
        return Ok(());
    };
    if function.params.len() != args.len() {
        return Ok(());
    }

    for (position, ((param, arg), ty)) in function.params.iter().zip(args).zip(&arg_types).enumerate() {
        let position = position + 1;
        if param.is_reference {
            if !arg.is_lvalue() {
                return Err(TypeError::new(
                    &arg.loc,
                    format!("argument {} of '{}' is passed by reference and must be a variable", position, name),
                )
                .with_record(&param.loc, format!("parameter '{}' declared here", param.name)));
            }
            // No implicit width conversion through a reference.
            if !ty.is_unknown() && *ty != param.ty && param.ty != Type::Pointer(None) {
                return Err(TypeError::new(
                    &arg.loc,
                    format!(
                        "argument {} of '{}' is passed by reference and must be of type '{}', found '{}'",
                        position, name, param.ty, ty
                    ),
                )
                .with_record(&param.loc, format!("parameter '{}' declared here", param.name)));
            }
        } else if !ty.is_unknown()
            && !param.ty.accepts(ty)
            && !(matches!(param.ty, Type::Pointer(_)) && *ty == Type::String)
        {
            return Err(TypeError::new(
                &arg.loc,
                format!(
                    "argument {} of '{}' expects a value of type '{}', found '{}'",
                    position, name, param.ty, ty
                ),
            ));
        }
    }
    Ok(())
}

fn check_system_call(call: &Node, function: SystemFunction, args: &[Node], env: &TypeEnv) -> Result<(), TypeError> {
    let name = function.name();
    let arity = |min: usize, max: usize| -> Result<(), TypeError> {
        if args.len() < min || args.len() > max {
            let expected = if min == max { min.to_string() } else { format!("{} to {}", min, max) };
            return Err(TypeError::new(
                &call.loc,
                format!("'{}' expects {} argument(s), but {} were given", name, expected, args.len()),
            ));
        }
        Ok(())
    };
    let type_of = |i: usize| args[i].resolve_type(env);
    let mismatch = |i: usize, expected: &str, found: &Type| {
        TypeError::new(
            &args[i].loc,
            format!("'{}' expects {}, found a value of type '{}'", name, expected, found),
        )
    };

    match function {
        SystemFunction::Write | SystemFunction::Writeln => {
            for (i, arg) in args.iter().enumerate() {
                let ty = arg.resolve_type(env);
                if matches!(ty, Type::Array(_) | Type::Record(_)) {
                    return Err(mismatch(i, "a printable value", &ty));
                }
                if matches!(ty, Type::File(_)) && i != 0 {
                    return Err(mismatch(i, "a printable value", &ty));
                }
            }
            Ok(())
        }
        SystemFunction::Printf => {
            arity(1, usize::MAX)?;
            let ty = type_of(0);
            if ty.is_unknown() || matches!(ty, Type::String | Type::Pointer(_)) {
                Ok(())
            } else {
                Err(mismatch(0, "a format string", &ty))
            }
        }
        SystemFunction::Exit => {
            arity(0, 1)?;
            if let Some(value) = args.first() {
                let expected = match env.function {
                    Some(func) if !func.is_procedure => func.return_type.clone(),
                    Some(_) => {
                        return Err(TypeError::new(&value.loc, "'exit' in a procedure cannot return a value"));
                    }
                    None => Type::int32(),
                };
                let ty = value.resolve_type_for(&expected, env);
                if !ty.is_unknown() && !expected.accepts(&ty) {
                    return Err(mismatch(0, &format!("a value of type '{}'", expected), &ty));
                }
            }
            Ok(())
        }
        SystemFunction::Halt => {
            arity(0, 1)?;
            match args.first() {
                Some(code) => expect_integer(code, "the exit code of 'halt'", env),
                None => Ok(()),
            }
        }
        SystemFunction::Low | SystemFunction::High => {
            arity(1, 1)?;
            match type_of(0) {
                Type::Unknown | Type::Array(_) => Ok(()),
                other => Err(mismatch(0, "an array", &other)),
            }
        }
        SystemFunction::Length => {
            arity(1, 1)?;
            match type_of(0) {
                Type::Unknown | Type::Array(_) | Type::String => Ok(()),
                other => Err(mismatch(0, "a string or an array", &other)),
            }
        }
        SystemFunction::SetLength => {
            arity(2, 2)?;
            if !args[0].is_lvalue() {
                return Err(TypeError::new(&args[0].loc, "'setlength' expects a variable"));
            }
            match type_of(0) {
                Type::Unknown | Type::String => {}
                Type::Array(array) if array.bounds.is_none() => {}
                other => return Err(mismatch(0, "a string or a dynamic array", &other)),
            }
            expect_integer(&args[1], "the length passed to 'setlength'", env)
        }
        SystemFunction::PChar => {
            arity(1, 1)?;
            match type_of(0) {
                Type::Unknown | Type::String => Ok(()),
                other => Err(mismatch(0, "a string", &other)),
            }
        }
        SystemFunction::New => {
            arity(1, 1)?;
            if !args[0].is_lvalue() {
                return Err(TypeError::new(&args[0].loc, "'new' expects a pointer variable"));
            }
            match type_of(0) {
                Type::Unknown | Type::Pointer(Some(_)) => Ok(()),
                other => Err(mismatch(0, "a typed pointer", &other)),
            }
        }
        SystemFunction::Assert => {
            arity(1, 1)?;
            match type_of(0) {
                Type::Unknown | Type::Boolean => Ok(()),
                other => Err(mismatch(0, "a Boolean condition", &other)),
            }
        }
    }
}
