// In src/ast/print.rs

//! Debug dump of the tree, one node per line, children indented.

use super::{Block, FunctionDefinition, Node, NodeKind, Unit, UnaryOperator};
use std::fmt::{self, Write};

impl Node {
    /// Writes the tree dump to stdout.
    pub fn print(&self) {
        print!("{}", self.dump());
    }

    pub fn dump(&self) -> String {
        let mut out = String::new();
        // Writing into a String cannot fail.
        let _ = write_node(&mut out, self, 0);
        out
    }
}

impl Unit {
    pub fn print(&self) {
        print!("{}", self.dump());
    }

    pub fn dump(&self) -> String {
        let mut out = String::new();
        let _ = write_unit(&mut out, self);
        out
    }
}

fn indent(out: &mut String, depth: usize) -> fmt::Result {
    write!(out, "{:width$}", "", width = depth * 2)
}

fn write_unit(out: &mut String, unit: &Unit) -> fmt::Result {
    writeln!(out, "{:?} {}", unit.kind, unit.name)?;
    if !unit.uses.is_empty() {
        writeln!(out, "  uses {}", unit.uses.join(", "))?;
    }
    for var in unit.symbols.variables() {
        let keyword = if var.is_constant { "const" } else { "var" };
        writeln!(out, "  {} {}: {}", keyword, var.name, var.ty)?;
        if let Some(init) = &var.initializer {
            write_node(out, init, 2)?;
        }
    }
    for function in unit.symbols.functions() {
        write_function(out, function)?;
    }
    write_block(out, &unit.body, 1)
}

fn write_function(out: &mut String, function: &FunctionDefinition) -> fmt::Result {
    let keyword = if function.is_procedure { "procedure" } else { "function" };
    write!(out, "  {} {}", keyword, function.signature())?;
    if !function.is_procedure {
        write!(out, ": {}", function.return_type)?;
    }
    if function.is_external {
        write!(out, " external")?;
    }
    writeln!(out)?;
    match &function.body {
        Some(body) => write_block(out, body, 2),
        None => Ok(()),
    }
}

fn write_block(out: &mut String, block: &Block, depth: usize) -> fmt::Result {
    indent(out, depth)?;
    writeln!(out, "Block {}", block.name)?;
    for var in &block.variables {
        indent(out, depth + 1)?;
        writeln!(out, "var {}: {} (scope {})", var.name, var.ty, var.scope_id)?;
        if let Some(init) = &var.initializer {
            write_node(out, init, depth + 2)?;
        }
    }
    for statement in &block.statements {
        write_node(out, statement, depth + 1)?;
    }
    Ok(())
}

fn write_node(out: &mut String, node: &Node, depth: usize) -> fmt::Result {
    if let NodeKind::Block(block) = &node.kind {
        return write_block(out, block, depth);
    }

    indent(out, depth)?;
    let children: Vec<&Node> = match &node.kind {
        NodeKind::IntLiteral(value) => {
            writeln!(out, "Int {}", value)?;
            vec![]
        }
        NodeKind::RealLiteral(value) => {
            writeln!(out, "Real {}", value)?;
            vec![]
        }
        NodeKind::BoolLiteral(value) => {
            writeln!(out, "Bool {}", value)?;
            vec![]
        }
        NodeKind::StringLiteral(value) => {
            writeln!(out, "String {:?}", String::from_utf8_lossy(value))?;
            vec![]
        }
        NodeKind::CharLiteral(code) => {
            writeln!(out, "Char #{}", code)?;
            vec![]
        }
        NodeKind::NilLiteral => {
            writeln!(out, "Nil")?;
            vec![]
        }
        NodeKind::Variable(name) => {
            writeln!(out, "Variable {}", name)?;
            vec![]
        }
        NodeKind::ArrayAccess { array, index } => {
            writeln!(out, "Index")?;
            vec![&**array, &**index]
        }
        NodeKind::FieldAccess { record, field } => {
            writeln!(out, "Field .{}", field)?;
            vec![&**record]
        }
        NodeKind::Dereference(pointer) => {
            writeln!(out, "Deref ^")?;
            vec![&**pointer]
        }
        NodeKind::AddressOf(target) => {
            writeln!(out, "AddressOf @")?;
            vec![&**target]
        }
        NodeKind::Unary { op, operand } => {
            let symbol = match op {
                UnaryOperator::Neg => "-",
                UnaryOperator::Not => "not",
            };
            writeln!(out, "Unary {}", symbol)?;
            vec![&**operand]
        }
        NodeKind::Binary { op, lhs, rhs } => {
            writeln!(out, "Binary {}", op.symbol())?;
            vec![&**lhs, &**rhs]
        }
        NodeKind::Comparison { op, lhs, rhs } => {
            writeln!(out, "Compare {}", op.symbol())?;
            vec![&**lhs, &**rhs]
        }
        NodeKind::Call { name, args } => {
            writeln!(out, "Call {}", name)?;
            args.iter().collect()
        }
        NodeKind::SystemCall { function, args, .. } => {
            writeln!(out, "SystemCall {}", function.name())?;
            args.iter().collect()
        }
        NodeKind::Assignment { target, value } => {
            writeln!(out, "Assign :=")?;
            vec![&**target, &**value]
        }
        NodeKind::If { condition, then_branch, else_branch } => {
            writeln!(out, "If")?;
            let mut children: Vec<&Node> = vec![&**condition, &**then_branch];
            children.extend(else_branch.as_deref());
            children
        }
        NodeKind::While { condition, body } => {
            writeln!(out, "While")?;
            vec![&**condition, &**body]
        }
        NodeKind::For { variable, start, end, descending, body } => {
            let direction = if *descending { "downto" } else { "to" };
            writeln!(out, "For {} {}", variable, direction)?;
            vec![&**start, &**end, &**body]
        }
        NodeKind::Repeat { body, condition } => {
            writeln!(out, "Repeat")?;
            write_block(out, body, depth + 1)?;
            vec![&**condition]
        }
        NodeKind::Break => {
            writeln!(out, "Break")?;
            vec![]
        }
        NodeKind::Continue => {
            writeln!(out, "Continue")?;
            vec![]
        }
        NodeKind::Block(_) => vec![],
    };

    for child in children {
        write_node(out, child, depth + 1)?;
    }
    Ok(())
}
