// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Lox Language Project

//! Single-pass Pratt parser that emits bytecode directly into a [`Chunk`]
//! owned by a heap-allocated [`ObjFunction`], one [`CompilerFrame`] per
//! function currently being compiled.
//!
//! The clox "table of `{prefixFn, infixFn, precedence}` rows indexed by
//! token kind" is expressed here as two `match`-based dispatch methods
//! (`parse_prefix`/`parse_infix`) plus a separate precedence lookup, rather
//! than a literal table of function pointers — Rust function items do not
//! share a single monomorphic pointer type across distinct lifetimes as
//! cleanly as C function pointers do, and a `match` reads just as directly
//! as a table lookup for a fixed, small token set.

mod frame;

use self::frame::{ClassState, CompilerFrame, FunctionType, UpvalueInfo};
use crate::bytecode::op;
use crate::diagnostics::report_compile_error;
use crate::heap::Heap;
use crate::scanner::{Scanner, Token, TokenKind};
use crate::value::{Obj, ObjRef, Value};
use std::fmt;

const MAX_LOCALS: usize = 256;
const MAX_UPVALUES: usize = 256;
const MAX_CONSTANTS: usize = 256;
const MAX_PARAMS_OR_ARGS: u32 = 254;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
enum Precedence {
    None,
    Assignment,
    Or,
    And,
    Equality,
    Comparison,
    Term,
    Factor,
    Unary,
    Call,
    Primary,
}

impl Precedence {
    const fn next(self) -> Self {
        match self {
            Self::None => Self::Assignment,
            Self::Assignment => Self::Or,
            Self::Or => Self::And,
            Self::And => Self::Equality,
            Self::Equality => Self::Comparison,
            Self::Comparison => Self::Term,
            Self::Term => Self::Factor,
            Self::Factor => Self::Unary,
            Self::Unary | Self::Call | Self::Primary => Self::Primary,
        }
    }
}

/// Raised when compilation accumulated one or more reported errors.
///
/// The errors themselves have already been written to stderr by the time
/// this is returned; it carries no message of its own.
#[derive(Debug)]
pub struct CompileError;

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "compilation failed")
    }
}

impl std::error::Error for CompileError {}

struct Parser<'src, 'h> {
    scanner: Scanner<'src>,
    current: Token<'src>,
    previous: Token<'src>,
    had_error: bool,
    panic_mode: bool,
    heap: &'h mut Heap,
    compilers: Vec<CompilerFrame>,
    classes: Vec<ClassState>,
}

/// Compiles `source` into a top-level script function, or reports compile
/// errors to stderr and returns [`CompileError`].
pub fn compile(source: &str, heap: &mut Heap) -> Result<ObjRef, CompileError> {
    let mut parser = Parser::new(source, heap);
    parser.advance();
    while !parser.match_token(TokenKind::Eof) {
        parser.declaration();
    }
    let function = parser.end_compiler();
    if parser.had_error {
        Err(CompileError)
    } else {
        Ok(function)
    }
}

impl<'src, 'h> Parser<'src, 'h> {
    fn new(source: &'src str, heap: &'h mut Heap) -> Self {
        let placeholder = Token {
            kind: TokenKind::Eof,
            lexeme: "",
            line: 0,
        };
        let root = CompilerFrame::new(heap, FunctionType::Script, None);
        Self {
            scanner: Scanner::new(source),
            current: placeholder,
            previous: placeholder,
            had_error: false,
            panic_mode: false,
            heap,
            compilers: vec![root],
            classes: Vec::new(),
        }
    }

    // ---- token stream plumbing -------------------------------------------------

    fn advance(&mut self) {
        self.previous = self.current;
        loop {
            self.current = self.scanner.scan_token();
            if self.current.kind != TokenKind::Error {
                break;
            }
            let message = self.current.lexeme;
            self.error_at_current(message);
        }
    }

    fn consume(&mut self, kind: TokenKind, message: &str) {
        if self.current.kind == kind {
            self.advance();
            return;
        }
        self.error_at_current(message);
    }

    fn check(&self, kind: TokenKind) -> bool {
        self.current.kind == kind
    }

    fn match_token(&mut self, kind: TokenKind) -> bool {
        if !self.check(kind) {
            return false;
        }
        self.advance();
        true
    }

    fn error_at_current(&mut self, message: &str) {
        let token = self.current;
        self.error_at(token, message);
    }

    fn error(&mut self, message: &str) {
        let token = self.previous;
        self.error_at(token, message);
    }

    fn error_at(&mut self, token: Token<'_>, message: &str) {
        if self.panic_mode {
            return;
        }
        self.panic_mode = true;
        self.had_error = true;
        report_compile_error(&mut std::io::stderr(), &token, message);
    }

    fn synchronize(&mut self) {
        self.panic_mode = false;
        while self.current.kind != TokenKind::Eof {
            if self.previous.kind == TokenKind::Semicolon {
                return;
            }
            match self.current.kind {
                TokenKind::Class
                | TokenKind::Fun
                | TokenKind::Var
                | TokenKind::For
                | TokenKind::If
                | TokenKind::While
                | TokenKind::Print
                | TokenKind::Return => return,
                _ => {}
            }
            self.advance();
        }
    }

    // ---- bytecode emission -------------------------------------------------

    fn chunk_mut(&mut self) -> &mut crate::bytecode::Chunk {
        let function = self.compilers.last().unwrap().function;
        match self.heap.get_mut(function) {
            Obj::Function(f) => &mut f.chunk,
            _ => unreachable!("compiler frame always points at a Function object"),
        }
    }

    fn emit_byte(&mut self, byte: u8, line: u32) {
        self.chunk_mut().write_byte(byte, line);
    }

    fn emit_bytes(&mut self, a: u8, b: u8, line: u32) {
        self.emit_byte(a, line);
        self.emit_byte(b, line);
    }

    fn emit_return(&mut self) {
        let line = self.previous.line;
        if self.compilers.last().unwrap().function_type == FunctionType::Initializer {
            self.emit_bytes(op::GET_LOCAL, 0, line);
        } else {
            self.emit_byte(op::NIL, line);
        }
        self.emit_byte(op::RETURN, line);
    }

    fn make_constant(&mut self, value: Value) -> u8 {
        let chunk = self.chunk_mut();
        if chunk.constants.len() >= MAX_CONSTANTS {
            self.error("Too many constants in one chunk.");
            return 0;
        }
        let index = chunk.add_constant(value);
        u8::try_from(index).expect("checked above against MAX_CONSTANTS")
    }

    fn emit_constant(&mut self, value: Value) {
        let line = self.previous.line;
        let index = self.make_constant(value);
        self.emit_bytes(op::CONSTANT, index, line);
    }

    fn identifier_constant(&mut self, name: &str) -> u8 {
        let r = self.heap.intern(name);
        self.make_constant(Value::Obj(r))
    }

    fn emit_jump(&mut self, instruction: u8) -> usize {
        let line = self.previous.line;
        self.emit_byte(instruction, line);
        self.chunk_mut().write_u16(0xFFFF, line);
        self.chunk_mut().code.len() - 2
    }

    fn patch_jump(&mut self, at: usize) {
        let jump = self.chunk_mut().code.len() - at - 2;
        if jump > usize::from(u16::MAX) {
            self.error("Too much code to jump over.");
            return;
        }
        let jump = u16::try_from(jump).expect("checked above");
        self.chunk_mut().patch_u16(at, jump);
    }

    fn emit_loop(&mut self, loop_start: usize) {
        let line = self.previous.line;
        self.emit_byte(op::LOOP, line);
        let offset = self.chunk_mut().code.len() - loop_start + 2;
        if offset > usize::from(u16::MAX) {
            self.error("Loop body too large.");
            return;
        }
        let offset = u16::try_from(offset).expect("checked above");
        self.chunk_mut().write_u16(offset, line);
    }

    // ---- scope & variable resolution -------------------------------------------------

    fn begin_scope(&mut self) {
        self.compilers.last_mut().unwrap().scope_depth += 1;
    }

    fn end_scope(&mut self) {
        let line = self.previous.line;
        self.compilers.last_mut().unwrap().scope_depth -= 1;
        let depth = self.compilers.last().unwrap().scope_depth;
        loop {
            let should_pop = {
                let frame = self.compilers.last().unwrap();
                frame.locals.last().filter(|local| local.depth > depth).map(|local| local.is_captured)
            };
            let Some(captured) = should_pop else { break };
            self.compilers.last_mut().unwrap().locals.pop();
            if captured {
                self.emit_byte(op::CLOSE_UPVALUE, line);
            } else {
                self.emit_byte(op::POP, line);
            }
        }
    }

    fn add_local(&mut self, name: String) {
        if self.compilers.last().unwrap().locals.len() >= MAX_LOCALS {
            self.error("Too many local variables in function.");
            return;
        }
        self.compilers.last_mut().unwrap().locals.push(frame::Local {
            name,
            depth: -1,
            is_captured: false,
        });
    }

    fn declare_variable(&mut self, name: &str) {
        let scope_depth = self.compilers.last().unwrap().scope_depth;
        if scope_depth == 0 {
            return;
        }
        let duplicate = {
            let frame = self.compilers.last().unwrap();
            let mut found = false;
            for local in frame.locals.iter().rev() {
                if local.depth != -1 && local.depth < scope_depth {
                    break;
                }
                if local.name == name {
                    found = true;
                    break;
                }
            }
            found
        };
        if duplicate {
            self.error("Already a variable with this name in this scope.");
            return;
        }
        self.add_local(name.to_owned());
    }

    fn mark_initialized(&mut self) {
        let frame = self.compilers.last_mut().unwrap();
        if frame.scope_depth == 0 {
            return;
        }
        let depth = frame.scope_depth;
        frame.locals.last_mut().unwrap().depth = depth;
    }

    fn parse_variable(&mut self, message: &str) -> u8 {
        self.consume(TokenKind::Identifier, message);
        let name = self.previous.lexeme;
        self.declare_variable(name);
        if self.compilers.last().unwrap().scope_depth > 0 {
            return 0;
        }
        self.identifier_constant(name)
    }

    fn define_variable(&mut self, global: u8) {
        if self.compilers.last().unwrap().scope_depth > 0 {
            self.mark_initialized();
            return;
        }
        let line = self.previous.line;
        self.emit_bytes(op::DEFINE_GLOBAL, global, line);
    }

    fn resolve_local(&mut self, frame_idx: usize, name: &str) -> Option<u8> {
        let locals_len = self.compilers[frame_idx].locals.len();
        for i in (0..locals_len).rev() {
            if self.compilers[frame_idx].locals[i].name == name {
                if self.compilers[frame_idx].locals[i].depth == -1 {
                    self.error("Can't read local variable in its own initializer.");
                }
                return Some(u8::try_from(i).expect("MAX_LOCALS keeps this under 256"));
            }
        }
        None
    }

    fn resolve_upvalue(&mut self, frame_idx: usize, name: &str) -> Option<u8> {
        if frame_idx == 0 {
            return None;
        }
        let enclosing_idx = frame_idx - 1;
        if let Some(local) = self.resolve_local(enclosing_idx, name) {
            self.compilers[enclosing_idx].locals[local as usize].is_captured = true;
            return Some(self.add_upvalue(frame_idx, local, true));
        }
        if let Some(upvalue) = self.resolve_upvalue(enclosing_idx, name) {
            return Some(self.add_upvalue(frame_idx, upvalue, false));
        }
        None
    }

    /// Records `{index, isLocal}` verbatim (never collapsed to a boolean —
    /// the historical regression spec.md documents).
    fn add_upvalue(&mut self, frame_idx: usize, index: u8, is_local: bool) -> u8 {
        for (i, up) in self.compilers[frame_idx].upvalues.iter().enumerate() {
            if up.index == index && up.is_local == is_local {
                return u8::try_from(i).expect("MAX_UPVALUES keeps this under 256");
            }
        }
        if self.compilers[frame_idx].upvalues.len() >= MAX_UPVALUES {
            self.error("Too many closure variables in function.");
            return 0;
        }
        self.compilers[frame_idx].upvalues.push(UpvalueInfo { index, is_local });
        let count = self.compilers[frame_idx].upvalues.len();
        let function = self.compilers[frame_idx].function;
        if let Obj::Function(f) = self.heap.get_mut(function) {
            f.upvalue_count = u8::try_from(count).expect("MAX_UPVALUES keeps this under 256");
        }
        u8::try_from(count - 1).expect("MAX_UPVALUES keeps this under 256")
    }

    fn resolve_name(&mut self, name: &str) -> (u8, u8, u8) {
        let frame_idx = self.compilers.len() - 1;
        if let Some(slot) = self.resolve_local(frame_idx, name) {
            (op::GET_LOCAL, op::SET_LOCAL, slot)
        } else if let Some(slot) = self.resolve_upvalue(frame_idx, name) {
            (op::GET_UPVALUE, op::SET_UPVALUE, slot)
        } else {
            let arg = self.identifier_constant(name);
            (op::GET_GLOBAL, op::SET_GLOBAL, arg)
        }
    }

    fn named_variable(&mut self, name: &str, can_assign: bool, line: u32) {
        let (get_op, set_op, arg) = self.resolve_name(name);
        if can_assign && self.match_token(TokenKind::Equal) {
            self.expression();
            self.emit_bytes(set_op, arg, line);
        } else {
            self.emit_bytes(get_op, arg, line);
        }
    }

    // ---- expressions -------------------------------------------------

    fn expression(&mut self) {
        self.parse_precedence(Precedence::Assignment);
    }

    fn parse_precedence(&mut self, precedence: Precedence) {
        self.advance();
        let can_assign = precedence <= Precedence::Assignment;
        if !self.parse_prefix(self.previous.kind, can_assign) {
            self.error("Expect expression.");
            return;
        }
        while precedence <= Self::infix_precedence(self.current.kind) {
            self.advance();
            self.parse_infix(self.previous.kind, can_assign);
        }
        if can_assign && self.match_token(TokenKind::Equal) {
            self.error("Invalid assignment target.");
        }
    }

    const fn infix_precedence(kind: TokenKind) -> Precedence {
        match kind {
            TokenKind::LeftParen | TokenKind::Dot => Precedence::Call,
            TokenKind::Minus | TokenKind::Plus => Precedence::Term,
            TokenKind::Slash | TokenKind::Star => Precedence::Factor,
            TokenKind::BangEqual | TokenKind::EqualEqual => Precedence::Equality,
            TokenKind::Greater | TokenKind::GreaterEqual | TokenKind::Less | TokenKind::LessEqual => {
                Precedence::Comparison
            }
            TokenKind::And => Precedence::And,
            TokenKind::Or => Precedence::Or,
            _ => Precedence::None,
        }
    }

    fn parse_prefix(&mut self, kind: TokenKind, can_assign: bool) -> bool {
        match kind {
            TokenKind::LeftParen => self.grouping(),
            TokenKind::Minus | TokenKind::Bang => self.unary(),
            TokenKind::Number => self.number(),
            TokenKind::String => self.string_literal(),
            TokenKind::Identifier => self.variable(can_assign),
            TokenKind::True | TokenKind::False | TokenKind::Nil => self.literal(),
            TokenKind::This => self.this_expr(),
            TokenKind::Super => self.super_expr(),
            _ => return false,
        }
        true
    }

    fn parse_infix(&mut self, kind: TokenKind, can_assign: bool) {
        match kind {
            TokenKind::LeftParen => self.call(),
            TokenKind::Dot => self.dot(can_assign),
            TokenKind::Minus
            | TokenKind::Plus
            | TokenKind::Slash
            | TokenKind::Star
            | TokenKind::BangEqual
            | TokenKind::EqualEqual
            | TokenKind::Greater
            | TokenKind::GreaterEqual
            | TokenKind::Less
            | TokenKind::LessEqual => self.binary(),
            TokenKind::And => self.and_(),
            TokenKind::Or => self.or_(),
            _ => unreachable!("{kind:?} has no infix rule"),
        }
    }

    fn grouping(&mut self) {
        self.expression();
        self.consume(TokenKind::RightParen, "Expect ')' after expression.");
    }

    fn unary(&mut self) {
        let kind = self.previous.kind;
        let line = self.previous.line;
        self.parse_precedence(Precedence::Unary);
        match kind {
            TokenKind::Bang => self.emit_byte(op::NOT, line),
            TokenKind::Minus => self.emit_byte(op::NEGATE, line),
            _ => unreachable!(),
        }
    }

    fn binary(&mut self) {
        let kind = self.previous.kind;
        let line = self.previous.line;
        self.parse_precedence(Self::infix_precedence(kind).next());
        match kind {
            TokenKind::Plus => self.emit_byte(op::ADD, line),
            TokenKind::Minus => self.emit_byte(op::SUBTRACT, line),
            TokenKind::Star => self.emit_byte(op::MULTIPLY, line),
            TokenKind::Slash => self.emit_byte(op::DIVIDE, line),
            TokenKind::EqualEqual => self.emit_byte(op::EQUAL, line),
            TokenKind::BangEqual => self.emit_bytes(op::EQUAL, op::NOT, line),
            TokenKind::Greater => self.emit_byte(op::GREATER, line),
            TokenKind::GreaterEqual => self.emit_bytes(op::LESS, op::NOT, line),
            TokenKind::Less => self.emit_byte(op::LESS, line),
            TokenKind::LessEqual => self.emit_bytes(op::GREATER, op::NOT, line),
            _ => unreachable!(),
        }
    }

    fn number(&mut self) {
        let value: f64 = self.previous.lexeme.parse().expect("scanner only emits well-formed numeric lexemes");
        self.emit_constant(Value::Number(value));
    }

    fn string_literal(&mut self) {
        let raw = self.previous.lexeme;
        let text = &raw[1..raw.len() - 1];
        let r = self.heap.intern(text);
        self.emit_constant(Value::Obj(r));
    }

    fn literal(&mut self) {
        let line = self.previous.line;
        match self.previous.kind {
            TokenKind::False => self.emit_byte(op::FALSE, line),
            TokenKind::Nil => self.emit_byte(op::NIL, line),
            TokenKind::True => self.emit_byte(op::TRUE, line),
            _ => unreachable!(),
        }
    }

    fn variable(&mut self, can_assign: bool) {
        let name = self.previous.lexeme;
        let line = self.previous.line;
        self.named_variable(name, can_assign, line);
    }

    fn this_expr(&mut self) {
        let line = self.previous.line;
        if self.classes.is_empty() {
            self.error("Can't use 'this' outside of a class.");
            return;
        }
        self.named_variable("this", false, line);
    }

    fn super_expr(&mut self) {
        let line = self.previous.line;
        if self.classes.is_empty() {
            self.error("Can't use 'super' outside of a class.");
        } else if !self.classes.last().unwrap().has_superclass {
            self.error("Can't use 'super' in a class with no superclass.");
        }
        self.consume(TokenKind::Dot, "Expect '.' after 'super'.");
        self.consume(TokenKind::Identifier, "Expect superclass method name.");
        let method_name = self.previous.lexeme;
        let name = self.identifier_constant(method_name);
        self.named_variable("this", false, line);
        if self.match_token(TokenKind::LeftParen) {
            let argc = self.argument_list();
            self.named_variable("super", false, line);
            self.emit_bytes(op::SUPER_INVOKE, name, line);
            self.emit_byte(argc, line);
        } else {
            self.named_variable("super", false, line);
            self.emit_bytes(op::GET_SUPER, name, line);
        }
    }

    fn and_(&mut self) {
        let line = self.previous.line;
        let end_jump = self.emit_jump(op::JUMP_IF_FALSE);
        self.emit_byte(op::POP, line);
        self.parse_precedence(Precedence::And);
        self.patch_jump(end_jump);
    }

    fn or_(&mut self) {
        let line = self.previous.line;
        let else_jump = self.emit_jump(op::JUMP_IF_FALSE);
        let end_jump = self.emit_jump(op::JUMP);
        self.patch_jump(else_jump);
        self.emit_byte(op::POP, line);
        self.parse_precedence(Precedence::Or);
        self.patch_jump(end_jump);
    }

    fn call(&mut self) {
        let line = self.previous.line;
        let argc = self.argument_list();
        self.emit_bytes(op::CALL, argc, line);
    }

    fn argument_list(&mut self) -> u8 {
        let mut argc: u32 = 0;
        if !self.check(TokenKind::RightParen) {
            loop {
                self.expression();
                if argc == MAX_PARAMS_OR_ARGS {
                    self.error("Can't have more than 254 arguments.");
                }
                argc += 1;
                if !self.match_token(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.consume(TokenKind::RightParen, "Expect ')' after arguments.");
        u8::try_from(argc.min(255)).unwrap_or(255)
    }

    fn dot(&mut self, can_assign: bool) {
        let line = self.previous.line;
        self.consume(TokenKind::Identifier, "Expect property name after '.'.");
        let prop_name = self.previous.lexeme;
        let name = self.identifier_constant(prop_name);
        if can_assign && self.match_token(TokenKind::Equal) {
            self.expression();
            self.emit_bytes(op::SET_PROPERTY, name, line);
        } else if self.match_token(TokenKind::LeftParen) {
            let argc = self.argument_list();
            self.emit_bytes(op::INVOKE, name, line);
            self.emit_byte(argc, line);
        } else {
            self.emit_bytes(op::GET_PROPERTY, name, line);
        }
    }

    // ---- statements -------------------------------------------------

    fn declaration(&mut self) {
        if self.match_token(TokenKind::Class) {
            self.class_declaration();
        } else if self.match_token(TokenKind::Fun) {
            self.fun_declaration();
        } else if self.match_token(TokenKind::Var) {
            self.var_declaration();
        } else {
            self.statement();
        }
        if self.panic_mode {
            self.synchronize();
        }
    }

    fn class_declaration(&mut self) {
        self.consume(TokenKind::Identifier, "Expect class name.");
        let class_name = self.previous.lexeme;
        let line = self.previous.line;
        let name_constant = self.identifier_constant(class_name);
        self.declare_variable(class_name);
        self.emit_bytes(op::CLASS, name_constant, line);
        self.define_variable(name_constant);
        self.classes.push(ClassState { has_superclass: false });

        if self.match_token(TokenKind::Less) {
            self.consume(TokenKind::Identifier, "Expect superclass name.");
            let super_name = self.previous.lexeme;
            let super_line = self.previous.line;
            if super_name == class_name {
                self.error("A class can't inherit from itself.");
            }
            self.named_variable(super_name, false, super_line);
            self.begin_scope();
            self.add_local("super".to_owned());
            self.mark_initialized();
            self.named_variable(class_name, false, line);
            self.emit_byte(op::INHERIT, line);
            self.classes.last_mut().unwrap().has_superclass = true;
        }

        self.named_variable(class_name, false, line);
        self.consume(TokenKind::LeftBrace, "Expect '{' before class body.");
        while !self.check(TokenKind::RightBrace) && !self.check(TokenKind::Eof) {
            self.method();
        }
        self.consume(TokenKind::RightBrace, "Expect '}' after class body.");
        self.emit_byte(op::POP, line);

        if self.classes.last().unwrap().has_superclass {
            self.end_scope();
        }
        self.classes.pop();
    }

    fn method(&mut self) {
        self.consume(TokenKind::Identifier, "Expect method name.");
        let name = self.previous.lexeme;
        let line = self.previous.line;
        let constant = self.identifier_constant(name);
        let function_type = if name == "init" { FunctionType::Initializer } else { FunctionType::Method };
        self.function(function_type);
        self.emit_bytes(op::METHOD, constant, line);
    }

    fn fun_declaration(&mut self) {
        let global = self.parse_variable("Expect function name.");
        self.mark_initialized();
        self.function(FunctionType::Function);
        self.define_variable(global);
    }

    fn function(&mut self, function_type: FunctionType) {
        let name_text = self.previous.lexeme;
        let name_ref = self.heap.intern(name_text);
        let new_frame = CompilerFrame::new(self.heap, function_type, Some(name_ref));
        let function_ref = new_frame.function;
        self.compilers.push(new_frame);

        self.begin_scope();
        self.consume(TokenKind::LeftParen, "Expect '(' after function name.");
        let mut arity: u32 = 0;
        if !self.check(TokenKind::RightParen) {
            loop {
                if arity == MAX_PARAMS_OR_ARGS {
                    self.error_at_current("Can't have more than 254 parameters.");
                }
                arity += 1;
                let constant = self.parse_variable("Expect parameter name.");
                self.define_variable(constant);
                if !self.match_token(TokenKind::Comma) {
                    break;
                }
            }
        }
        if let Obj::Function(f) = self.heap.get_mut(function_ref) {
            f.arity = u8::try_from(arity.min(255)).unwrap_or(255);
        }
        self.consume(TokenKind::RightParen, "Expect ')' after parameters.");
        self.consume(TokenKind::LeftBrace, "Expect '{' before function body.");
        self.block();
        self.end_function();
    }

    fn end_function(&mut self) {
        self.emit_return();
        let frame = self.compilers.pop().unwrap();
        self.heap.unpin();
        let line = self.previous.line;
        let constant = self.make_constant(Value::Obj(frame.function));
        self.emit_bytes(op::CLOSURE, constant, line);
        for upvalue in &frame.upvalues {
            self.emit_byte(u8::from(upvalue.is_local), line);
            self.emit_byte(upvalue.index, line);
        }
    }

    fn end_compiler(&mut self) -> ObjRef {
        self.emit_return();
        let frame = self.compilers.pop().unwrap();
        self.heap.unpin();
        frame.function
    }

    fn var_declaration(&mut self) {
        let global = self.parse_variable("Expect variable name.");
        let line = self.previous.line;
        if self.match_token(TokenKind::Equal) {
            self.expression();
        } else {
            self.emit_byte(op::NIL, line);
        }
        self.consume(TokenKind::Semicolon, "Expect ';' after variable declaration.");
        self.define_variable(global);
    }

    fn statement(&mut self) {
        if self.match_token(TokenKind::Print) {
            self.print_statement();
        } else if self.match_token(TokenKind::For) {
            self.for_statement();
        } else if self.match_token(TokenKind::If) {
            self.if_statement();
        } else if self.match_token(TokenKind::Return) {
            self.return_statement();
        } else if self.match_token(TokenKind::While) {
            self.while_statement();
        } else if self.match_token(TokenKind::LeftBrace) {
            self.begin_scope();
            self.block();
            self.end_scope();
        } else {
            self.expression_statement();
        }
    }

    fn block(&mut self) {
        while !self.check(TokenKind::RightBrace) && !self.check(TokenKind::Eof) {
            self.declaration();
        }
        self.consume(TokenKind::RightBrace, "Expect '}' after block.");
    }

    fn print_statement(&mut self) {
        self.expression();
        let line = self.previous.line;
        self.consume(TokenKind::Semicolon, "Expect ';' after value.");
        self.emit_byte(op::PRINT, line);
    }

    fn expression_statement(&mut self) {
        self.expression();
        let line = self.previous.line;
        self.consume(TokenKind::Semicolon, "Expect ';' after expression.");
        self.emit_byte(op::POP, line);
    }

    fn if_statement(&mut self) {
        self.consume(TokenKind::LeftParen, "Expect '(' after 'if'.");
        self.expression();
        self.consume(TokenKind::RightParen, "Expect ')' after condition.");
        let line = self.previous.line;

        let then_jump = self.emit_jump(op::JUMP_IF_FALSE);
        self.emit_byte(op::POP, line);
        self.statement();
        let else_jump = self.emit_jump(op::JUMP);

        self.patch_jump(then_jump);
        self.emit_byte(op::POP, line);
        if self.match_token(TokenKind::Else) {
            self.statement();
        }
        self.patch_jump(else_jump);
    }

    fn while_statement(&mut self) {
        let loop_start = self.chunk_mut().code.len();
        self.consume(TokenKind::LeftParen, "Expect '(' after 'while'.");
        self.expression();
        self.consume(TokenKind::RightParen, "Expect ')' after condition.");
        let line = self.previous.line;

        let exit_jump = self.emit_jump(op::JUMP_IF_FALSE);
        self.emit_byte(op::POP, line);
        self.statement();
        self.emit_loop(loop_start);

        self.patch_jump(exit_jump);
        self.emit_byte(op::POP, line);
    }

    fn for_statement(&mut self) {
        self.begin_scope();
        self.consume(TokenKind::LeftParen, "Expect '(' after 'for'.");
        if self.match_token(TokenKind::Semicolon) {
            // no initializer
        } else if self.match_token(TokenKind::Var) {
            self.var_declaration();
        } else {
            self.expression_statement();
        }

        let mut loop_start = self.chunk_mut().code.len();
        let mut exit_jump = None;
        if !self.match_token(TokenKind::Semicolon) {
            self.expression();
            let line = self.previous.line;
            self.consume(TokenKind::Semicolon, "Expect ';' after loop condition.");
            exit_jump = Some(self.emit_jump(op::JUMP_IF_FALSE));
            self.emit_byte(op::POP, line);
        }

        if !self.check(TokenKind::RightParen) {
            let body_jump = self.emit_jump(op::JUMP);
            let increment_start = self.chunk_mut().code.len();
            self.expression();
            let line = self.previous.line;
            self.emit_byte(op::POP, line);
            self.consume(TokenKind::RightParen, "Expect ')' after for clauses.");
            self.emit_loop(loop_start);
            loop_start = increment_start;
            self.patch_jump(body_jump);
        } else {
            self.consume(TokenKind::RightParen, "Expect ')' after for clauses.");
        }

        self.statement();
        self.emit_loop(loop_start);

        if let Some(exit_jump) = exit_jump {
            self.patch_jump(exit_jump);
            let line = self.previous.line;
            self.emit_byte(op::POP, line);
        }
        self.end_scope();
    }

    fn return_statement(&mut self) {
        if self.compilers.last().unwrap().function_type == FunctionType::Script {
            self.error("Can't return from top-level code.");
        }
        let line = self.previous.line;
        if self.match_token(TokenKind::Semicolon) {
            self.emit_return();
        } else {
            if self.compilers.last().unwrap().function_type == FunctionType::Initializer {
                self.error("Can't return a value from an initializer.");
            }
            self.expression();
            self.consume(TokenKind::Semicolon, "Expect ';' after return value.");
            self.emit_byte(op::RETURN, line);
        }
    }
}

#[cfg(test)]
#[path = "compiler_test.rs"]
mod compiler_test;
