//! Textual quad format.
//!
//! A small line-oriented format for writing functions by hand, used by the
//! tests and by the `quadc` binary. It stands in for the quad generator.
//!
//! ```text
//! # comments start with a hash
//! func gcd
//!   param a: i64 @0
//!   param b: i64 @1
//!   temp r: i64
//!   temp c: bool
//! top:
//!   c = eq b, 0
//!   jmpif c, done
//!   r = mod a, b
//!   a = mov b
//!   b = mov r
//!   jmp top
//! done:
//!   ret a
//! end
//! ```
//!
//! Declarations are `temp | local | global | param | array | funcref`
//! followed by `name: type`; `param` takes a position (`@N`). Types are
//! `i8..i64`, `u8..u64`, `f32`, `f64`, `bool`, `ptr`, `struct N` and
//! `[T; N]`. A mnemonic may carry a type suffix (`add.u32`); otherwise the
//! opcode takes its tags from the destination (operands for comparisons).

use hashbrown::HashMap;
use std::fmt::Write as _;

use super::var::{Allocation, Imm, VarData, VarKind, VarType};
use super::{DataSize, DataType, Function, LabelId, OpKind, Opcode, Operand, Quad, VarId};
use crate::core::error::{CompileError, CompileResult};
use crate::core::register_file::RegisterInfo;
use crate::core::session::CompilationSession;

/// Parse every function in `text`.
pub fn parse_module<'a>(
    session: &CompilationSession<'a>,
    text: &str,
) -> CompileResult<Vec<Function<'a>>> {
    let mut functions = Vec::new();
    let mut current: Option<FunctionParser<'_, 'a>> = None;

    for (idx, raw) in text.lines().enumerate() {
        let line_no = idx + 1;
        let line = raw.split('#').next().unwrap_or("").trim();
        if line.is_empty() {
            continue;
        }

        if let Some(name) = line.strip_prefix("func ") {
            if current.is_some() {
                return Err(parse_error(line_no, "nested function"));
            }
            current = Some(FunctionParser::new(session, name.trim()));
            continue;
        }

        if line == "end" {
            let parser = current
                .take()
                .ok_or_else(|| parse_error(line_no, "`end` outside of a function"))?;
            functions.push(parser.finish(line_no)?);
            continue;
        }

        let Some(parser) = current.as_mut() else {
            return Err(parse_error(line_no, "statement outside of a function"));
        };
        parser.parse_line(line).map_err(|reason| parse_error(line_no, &reason))?;
    }

    if current.is_some() {
        return Err(parse_error(text.lines().count(), "missing `end`"));
    }
    Ok(functions)
}

fn parse_error(line: usize, reason: &str) -> CompileError {
    CompileError::Parse {
        line,
        reason: reason.to_string(),
    }
}

struct FunctionParser<'s, 'a> {
    session: &'s CompilationSession<'a>,
    func: Function<'a>,
    vars: HashMap<String, VarId>,
    labels: HashMap<String, LabelId>,
    defined_labels: Vec<LabelId>,
}

impl<'s, 'a> FunctionParser<'s, 'a> {
    fn new(session: &'s CompilationSession<'a>, name: &str) -> Self {
        Self {
            session,
            func: Function::new(session, name),
            vars: HashMap::new(),
            labels: HashMap::new(),
            defined_labels: Vec::new(),
        }
    }

    fn finish(self, line_no: usize) -> CompileResult<Function<'a>> {
        for (name, id) in &self.labels {
            if !self.defined_labels.contains(id) {
                return Err(parse_error(line_no, &format!("label `{name}` is never defined")));
            }
        }
        Ok(self.func)
    }

    fn parse_line(&mut self, line: &str) -> Result<(), String> {
        if let Some(label) = line.strip_suffix(':') {
            let id = self.label(label.trim());
            if self.defined_labels.contains(&id) {
                return Err(format!("label `{}` defined twice", label.trim()));
            }
            self.defined_labels.push(id);
            self.func.push_quad(Quad::new(
                Opcode::plain(OpKind::Label),
                None,
                Operand::Label(id),
                None,
            ));
            return Ok(());
        }

        let mut words = line.splitn(2, char::is_whitespace);
        let head = words.next().unwrap_or("");
        let rest = words.next().unwrap_or("").trim();
        if let Some(kind) = decl_kind(head).filter(|_| !line.contains('=')) {
            return self.parse_decl(kind, rest);
        }

        match line.split_once('=') {
            Some((dest, rhs)) => {
                let dest = self.var(dest.trim())?;
                self.parse_quad(Some(dest), rhs.trim())
            }
            None => self.parse_quad(None, line),
        }
    }

    fn parse_decl(&mut self, kind: DeclKind, rest: &str) -> Result<(), String> {
        let (name, ty_text) = rest
            .split_once(':')
            .ok_or_else(|| format!("declaration `{rest}` is missing a type"))?;
        let name = name.trim();
        if name.is_empty() || self.vars.contains_key(name) {
            return Err(format!("bad or duplicate variable name `{name}`"));
        }

        let (ty_text, position) = match ty_text.split_once('@') {
            Some((ty, pos)) => {
                let pos = pos
                    .trim()
                    .parse::<u32>()
                    .map_err(|_| format!("bad argument position `{pos}`"))?;
                (ty.trim(), Some(pos))
            }
            None => (ty_text.trim(), None),
        };
        let (ty, size, align) = parse_var_type(ty_text)?;

        let var_kind = match kind {
            DeclKind::Temp => VarKind::Temp,
            DeclKind::Local => VarKind::Local,
            DeclKind::Global => VarKind::Global,
            DeclKind::Array => VarKind::Array,
            DeclKind::FuncRef => VarKind::Function,
            DeclKind::Param => VarKind::Argument {
                index: position.ok_or("param declarations need a position (`@N`)")?,
            },
        };
        let interned = self.session.intern_str(name);
        let data = VarData::new(var_kind, ty, size)
            .with_align(align)
            .with_name(interned);
        let id = self.func.add_var(data);
        self.vars.insert(name.to_string(), id);
        Ok(())
    }

    fn parse_quad(&mut self, dest: Option<VarId>, text: &str) -> Result<(), String> {
        let mut words = text.splitn(2, char::is_whitespace);
        let mnemonic = words.next().unwrap_or("");
        let operands: Vec<&str> = words
            .next()
            .unwrap_or("")
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect();

        let (kind_name, suffix) = match mnemonic.split_once('.') {
            Some((k, s)) => (k, Some(s)),
            None => (mnemonic, None),
        };
        let kind = OpKind::from_name(kind_name)
            .ok_or_else(|| format!("unknown mnemonic `{kind_name}`"))?;
        if kind == OpKind::Label {
            return Err("labels are written as `name:`".to_string());
        }

        let wants_dest = matches!(
            kind,
            OpKind::SetArg
                | OpKind::Call
                | OpKind::Return
                | OpKind::Store
                | OpKind::Jump
                | OpKind::JumpIf
                | OpKind::JumpIfNot
        );
        if wants_dest == dest.is_some() {
            return Err(if wants_dest {
                format!("`{kind_name}` has no destination")
            } else {
                format!("`{kind_name}` needs a destination")
            });
        }

        let expect = |n: usize| -> Result<(), String> {
            if operands.len() == n {
                Ok(())
            } else {
                Err(format!("`{kind_name}` takes {n} operand(s), got {}", operands.len()))
            }
        };

        let (ty, size) = match suffix {
            Some(s) => parse_scalar(s)?,
            None => self.default_tags(kind, dest, &operands),
        };

        let (op1, op2) = match kind {
            OpKind::Add
            | OpKind::Sub
            | OpKind::Mul
            | OpKind::Div
            | OpKind::Mod
            | OpKind::And
            | OpKind::Or
            | OpKind::Xor
            | OpKind::Shl
            | OpKind::Shr
            | OpKind::CmpEq
            | OpKind::CmpNe
            | OpKind::CmpLt
            | OpKind::CmpLe
            | OpKind::CmpGt
            | OpKind::CmpGe
            | OpKind::ArrayAddr => {
                expect(2)?;
                (self.value(operands[0])?, Some(self.source(operands[1], ty, size)?))
            }
            OpKind::Neg
            | OpKind::Not
            | OpKind::LNot
            | OpKind::Cast
            | OpKind::Move
            | OpKind::AddrOf => {
                expect(1)?;
                (Operand::Var(self.var(operands[0])?), None)
            }
            OpKind::Const => {
                expect(1)?;
                (Operand::Imm(parse_int(operands[0])?), None)
            }
            OpKind::Load => {
                expect(1)?;
                (Operand::None, Some(self.var(operands[0])?))
            }
            OpKind::Store => {
                expect(2)?;
                (self.value(operands[1])?, Some(self.var(operands[0])?))
            }
            OpKind::SetArg => {
                expect(2)?;
                (Operand::Imm(parse_int(operands[0])?), Some(self.source(operands[1], ty, size)?))
            }
            OpKind::GetArg => {
                expect(1)?;
                (Operand::Imm(parse_int(operands[0])?), None)
            }
            OpKind::GetRetVal => {
                expect(0)?;
                (Operand::None, None)
            }
            OpKind::Call => {
                if operands.is_empty() || operands.len() > 2 {
                    return Err("`call` takes a symbol and an optional pointer".to_string());
                }
                let symbol = self.session.intern_str(operands[0]);
                let pointer = match operands.get(1) {
                    Some(p) => Some(self.var(p)?),
                    None => None,
                };
                (Operand::Symbol(self.func.add_symbol(symbol)), pointer)
            }
            OpKind::Return => match operands.as_slice() {
                [] => (Operand::None, None),
                [v] => (Operand::None, Some(self.source(v, ty, size)?)),
                _ => return Err("`ret` takes at most one operand".to_string()),
            },
            OpKind::Jump => {
                expect(1)?;
                (Operand::Label(self.label(operands[0])), None)
            }
            OpKind::JumpIf | OpKind::JumpIfNot => {
                expect(2)?;
                (Operand::Label(self.label(operands[1])), Some(self.var(operands[0])?))
            }
            OpKind::Label => unreachable!("rejected above"),
        };

        self.func.push_quad(Quad::new(Opcode::new(kind, ty, size), dest, op1, op2));
        Ok(())
    }

    /// Opcode tags taken from the destination, or from the operands for
    /// comparisons and value-consuming quads without a result.
    fn default_tags(
        &self,
        kind: OpKind,
        dest: Option<VarId>,
        operands: &[&str],
    ) -> (DataType, DataSize) {
        let named = |name: &&str| self.vars.get(*name).copied();
        let operand_var = if kind == OpKind::Store {
            operands.iter().rev().find_map(named)
        } else {
            operands.iter().find_map(named)
        };
        let reads_operand = matches!(kind, OpKind::Store | OpKind::SetArg | OpKind::Return);
        let pick = if kind.is_compare() || reads_operand {
            operand_var.or(dest)
        } else {
            dest.or(operand_var)
        };
        match pick {
            Some(v) => {
                let var = self.func.var(v);
                (var.data_type(), var.data_size())
            }
            None => (DataType::Signed, DataSize::S64),
        }
    }

    /// Variable operand; an integer literal is loaded into a fresh temporary
    /// through a `const` quad, the way a quad generator would emit it.
    fn source(&mut self, text: &str, ty: DataType, size: DataSize) -> Result<VarId, String> {
        if !looks_numeric(text) {
            return self.var(text);
        }
        let value = parse_int(text)?;
        let temp = self.func.add_temp(ty, size);
        self.func.push_quad(Quad::new(
            Opcode::new(OpKind::Const, ty, size),
            Some(temp),
            Operand::Imm(value),
            None,
        ));
        Ok(temp)
    }

    fn var(&self, name: &str) -> Result<VarId, String> {
        self.vars
            .get(name)
            .copied()
            .ok_or_else(|| format!("undeclared variable `{name}`"))
    }

    fn value(&self, text: &str) -> Result<Operand, String> {
        if looks_numeric(text) {
            Ok(Operand::Imm(parse_int(text)?))
        } else {
            Ok(Operand::Var(self.var(text)?))
        }
    }

    fn label(&mut self, name: &str) -> LabelId {
        if let Some(&id) = self.labels.get(name) {
            return id;
        }
        let id = self.func.new_label();
        self.labels.insert(name.to_string(), id);
        id
    }
}

#[derive(Clone, Copy)]
enum DeclKind {
    Temp,
    Local,
    Global,
    Param,
    Array,
    FuncRef,
}

fn decl_kind(word: &str) -> Option<DeclKind> {
    Some(match word {
        "temp" => DeclKind::Temp,
        "local" => DeclKind::Local,
        "global" => DeclKind::Global,
        "param" => DeclKind::Param,
        "array" => DeclKind::Array,
        "funcref" => DeclKind::FuncRef,
        _ => return None,
    })
}

fn looks_numeric(text: &str) -> bool {
    text.starts_with(|c: char| c.is_ascii_digit() || c == '-')
}

fn parse_int(text: &str) -> Result<i64, String> {
    let parsed = if let Some(hex) = text.strip_prefix("0x") {
        i64::from_str_radix(hex, 16)
    } else if let Some(hex) = text.strip_prefix("-0x") {
        i64::from_str_radix(hex, 16).map(|v| -v)
    } else {
        text.parse::<i64>()
    };
    parsed.map_err(|_| format!("bad integer `{text}`"))
}

fn parse_scalar(text: &str) -> Result<(DataType, DataSize), String> {
    let ty = match text {
        "bool" => return Ok((DataType::Bool, DataSize::S8)),
        "ptr" => return Ok((DataType::Pointer, DataSize::S64)),
        _ if text.starts_with('i') => DataType::Signed,
        _ if text.starts_with('u') => DataType::Unsigned,
        _ if text.starts_with('f') => DataType::Float,
        _ => return Err(format!("unknown type `{text}`")),
    };
    let size = match &text[1..] {
        "8" if ty != DataType::Float => DataSize::S8,
        "16" if ty != DataType::Float => DataSize::S16,
        "32" => DataSize::S32,
        "64" => DataSize::S64,
        _ => return Err(format!("unknown type `{text}`")),
    };
    Ok((ty, size))
}

/// Parse a declared variable type into (type, size, alignment).
fn parse_var_type(text: &str) -> Result<(VarType, u32, u32), String> {
    if let Some(size) = text.strip_prefix("struct") {
        let size = size
            .trim()
            .parse::<u32>()
            .map_err(|_| format!("bad struct size in `{text}`"))?;
        return Ok((VarType::Struct, size, 8));
    }
    if let Some(inner) = text.strip_prefix('[').and_then(|t| t.strip_suffix(']')) {
        let (elem, count) = inner
            .split_once(';')
            .ok_or_else(|| format!("bad array type `{text}`"))?;
        let (ty, size) = parse_scalar(elem.trim())?;
        let count = count
            .trim()
            .parse::<u32>()
            .map_err(|_| format!("bad array length in `{text}`"))?;
        return Ok((VarType::Scalar(ty), size.bytes() * count, size.bytes()));
    }
    let (ty, size) = parse_scalar(text)?;
    Ok((VarType::Scalar(ty), size.bytes(), size.bytes()))
}

fn type_name(ty: DataType, size: DataSize) -> String {
    match ty {
        DataType::Bool => "bool".to_string(),
        DataType::Pointer => "ptr".to_string(),
        DataType::Signed => format!("i{}", size.bits()),
        DataType::Unsigned => format!("u{}", size.bits()),
        DataType::Float => format!("f{}", size.bits()),
    }
}

fn var_type_name(var: &VarData<'_>) -> String {
    match (var.kind, var.ty) {
        (_, VarType::Struct) => format!("struct {}", var.size),
        (VarKind::Array, VarType::Scalar(ty)) => {
            let elem = var.align.max(1);
            let size = DataSize::from_bytes(elem).unwrap_or(DataSize::S64);
            format!("[{}; {}]", type_name(ty, size), var.size / elem)
        }
        (_, VarType::Scalar(ty)) => type_name(ty, var.data_size()),
    }
}

/// Render a function back into the text format.
pub fn print_function(func: &Function<'_>) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "func {}", func.name());
    for v in func.var_ids() {
        let var = func.var(v);
        let kind = match var.kind {
            VarKind::Temp => "temp",
            VarKind::Local => "local",
            VarKind::Global => "global",
            VarKind::Argument { .. } => "param",
            VarKind::Array => "array",
            VarKind::Function => "funcref",
        };
        let _ = write!(out, "  {kind} {}: {}", func.var_name(v), var_type_name(var));
        if let VarKind::Argument { index } = var.kind {
            let _ = write!(out, " @{index}");
        }
        out.push('\n');
    }
    for q in func.quad_ids() {
        let _ = writeln!(out, "{}", format_quad(func, func.quad(q)));
    }
    out.push_str("end\n");
    out
}

/// Render one quad.
pub fn format_quad(func: &Function<'_>, quad: &Quad) -> String {
    let kind = quad.kind();
    if kind == OpKind::Label {
        return format!("L{}:", quad.op1.as_label().unwrap_or(0));
    }

    let mnemonic = match kind {
        OpKind::Label
        | OpKind::Jump
        | OpKind::JumpIf
        | OpKind::JumpIfNot
        | OpKind::Call
        | OpKind::Return
        | OpKind::GetRetVal => kind.name().to_string(),
        _ => format!(
            "{}.{}",
            kind.name(),
            type_name(quad.op.data_type(), quad.op.data_size())
        ),
    };

    let operand = |op: Operand| -> String {
        match op {
            Operand::None => String::new(),
            Operand::Var(v) => func.var_name(v),
            Operand::Label(l) => format!("L{l}"),
            Operand::Imm(i) => i.to_string(),
            Operand::Symbol(s) => func.symbol(s).to_string(),
        }
    };
    let op2 = quad.op2.map(|v| func.var_name(v));

    let operands: Vec<String> = match kind {
        OpKind::Store => vec![op2.unwrap_or_default(), operand(quad.op1)],
        OpKind::JumpIf | OpKind::JumpIfNot => {
            vec![op2.unwrap_or_default(), operand(quad.op1)]
        }
        _ => {
            let mut ops = Vec::new();
            if quad.op1 != Operand::None {
                ops.push(operand(quad.op1));
            }
            ops.extend(op2);
            ops
        }
    };

    let mut line = String::from("  ");
    if let Some(d) = quad.dest {
        let _ = write!(line, "{} = ", func.var_name(d));
    }
    line.push_str(&mnemonic);
    if !operands.is_empty() {
        line.push(' ');
        line.push_str(&operands.join(", "));
    }
    line
}

/// One line per variable describing its final location.
pub fn print_allocation(func: &Function<'_>, regs: &RegisterInfo) -> String {
    let mut out = String::new();
    for v in func.var_ids() {
        let where_ = match func.var(v).alloc {
            Allocation::Unassigned => "unassigned".to_string(),
            Allocation::Register(r) => regs.name(r).to_string(),
            Allocation::Memory(off) => format!("[rbp{off:+}]"),
            Allocation::Immediate(Imm::Int(i)) => format!("${i}"),
            Allocation::Immediate(Imm::Condition) => "flags".to_string(),
        };
        let _ = writeln!(out, "  {:<12} {}", func.var_name(v), where_);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::test_utils::test::with_test_context;

    const SAMPLE: &str = r#"
        # greatest common divisor
        func gcd
          param a: i64 @0
          param b: i64 @1
          temp r: i64
          temp c: bool
        top:
          c = eq b, 0
          jmpif c, done
          r = mod a, b
          a = mov b
          b = mov r
          jmp top
        done:
          ret a
        end
    "#;

    #[test]
    fn test_parse_sample() {
        with_test_context(|ctx| {
            let session = ctx.create_session();
            let funcs = parse_module(&session, SAMPLE).unwrap();
            assert_eq!(funcs.len(), 1);
            let func = &funcs[0];
            assert_eq!(func.name(), "gcd");
            // The literal in `eq b, 0` becomes a const temporary.
            assert_eq!(func.var_count(), 5);
            assert_eq!(func.quad_count(), 10);
            assert_eq!(func.var(VarId(0)).kind, VarKind::Argument { index: 0 });

            let mut ids = func.quad_ids().skip(1);
            let konst = func.quad(ids.next().unwrap());
            assert_eq!(konst.kind(), OpKind::Const);
            assert_eq!(konst.dest, Some(VarId(4)));
            let quad = func.quad(ids.next().unwrap());
            assert_eq!(quad.kind(), OpKind::CmpEq);
            // Comparison tags come from the operands, not the bool result.
            assert_eq!(quad.op.data_type(), DataType::Signed);
            assert_eq!(quad.op1, Operand::Var(VarId(1)));
            assert_eq!(quad.op2, Some(VarId(4)));
        });
    }

    #[test]
    fn test_print_reparses() {
        with_test_context(|ctx| {
            let session = ctx.create_session();
            let funcs = parse_module(&session, SAMPLE).unwrap();
            let printed = print_function(&funcs[0]);
            assert!(printed.contains("r = mod.i64 a, b"));
            assert!(printed.contains("jmpif c, L1"));

            let again = parse_module(&session, &printed).unwrap();
            assert_eq!(again[0].quad_count(), funcs[0].quad_count());
            assert_eq!(print_function(&again[0]), printed);
        });
    }

    #[test]
    fn test_declaration_types() {
        with_test_context(|ctx| {
            let session = ctx.create_session();
            let funcs = parse_module(
                &session,
                "func t\n array buf: [i32; 10]\n local s: struct 24\n global g: u16\n ret\nend\n",
            )
            .unwrap();
            let func = &funcs[0];
            assert_eq!(func.var(VarId(0)).size, 40);
            assert_eq!(func.var(VarId(0)).align, 4);
            assert_eq!(func.var(VarId(1)).ty, VarType::Struct);
            assert_eq!(func.var(VarId(2)).data_size(), DataSize::S16);
        });
    }

    #[test]
    fn test_parse_errors_carry_line() {
        with_test_context(|ctx| {
            let session = ctx.create_session();
            let err = parse_module(&session, "func f\n  x = mov y\nend\n").unwrap_err();
            assert!(matches!(err, CompileError::Parse { line: 2, .. }));

            let err = parse_module(&session, "func f\n  jmp nowhere\nend\n").unwrap_err();
            assert!(matches!(err, CompileError::Parse { line: 3, .. }));

            let err = parse_module(&session, "func f\n  ret\n").unwrap_err();
            assert!(matches!(err, CompileError::Parse { .. }));
        });
    }
}
