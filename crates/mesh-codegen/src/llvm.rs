//! MIR -> LLVM IR as text.
//!
//! The emitter produces opaque-pointer IR (LLVM 15+) that links against
//! the runtime staticlib. Every stdlib function is declared as an
//! external symbol from a single data-driven table; calls to declared
//! symbols coerce argument and result types to the declared signature
//! (mesh_string_eq returns i8, which becomes i1 at the call site).
//!
//! Value placement is memory-based: every binding gets an alloca slot,
//! and branch results merge through a result slot rather than phi
//! nodes. Heap objects are i64 slot arrays reached through
//! `mesh_gc_alloc_actor`; tuples carry the `{ u64 len, u64 elements[] }`
//! layout that `mesh_tuple_nth` expects.

use crate::mir::{
    BinOp, ForKind, MirExpr, MirFunction, MirLiteral, MirModule, MirType, UnaryOp,
};
use rustc_hash::FxHashMap;
use std::fmt::Write as _;

/// LLVM-level value slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    I64,
    I8,
    I1,
    Double,
    Ptr,
    Void,
}

impl Slot {
    fn ll(self) -> &'static str {
        match self {
            Slot::I64 => "i64",
            Slot::I8 => "i8",
            Slot::I1 => "i1",
            Slot::Double => "double",
            Slot::Ptr => "ptr",
            Slot::Void => "void",
        }
    }
}

fn llty(ty: &MirType) -> Slot {
    match ty {
        MirType::Int | MirType::Unit => Slot::I64,
        MirType::Bool => Slot::I1,
        MirType::Float => Slot::Double,
        MirType::String
        | MirType::Ptr
        | MirType::Tuple(_)
        | MirType::FnPtr(..)
        | MirType::Struct(_) => Slot::Ptr,
    }
}

/// One external runtime declaration.
struct RuntimeDecl {
    name: &'static str,
    params: &'static [Slot],
    ret: Slot,
}

macro_rules! decl {
    ($name:literal, [$($p:ident),*], $ret:ident) => {
        RuntimeDecl { name: $name, params: &[$(Slot::$p),*], ret: Slot::$ret }
    };
}

/// All runtime functions, in one table. This both emits the `declare`
/// lines and drives call-site coercion.
static RUNTIME_DECLS: &[RuntimeDecl] = &[
    // Memory
    decl!("mesh_gc_alloc_actor", [I64, I64], Ptr),
    // Strings
    decl!("mesh_string_concat", [Ptr, Ptr], Ptr),
    decl!("mesh_string_eq", [Ptr, Ptr], I8),
    decl!("mesh_string_compare", [Ptr, Ptr], I64),
    decl!("mesh_string_hash", [Ptr], I64),
    decl!("mesh_string_len", [Ptr], I64),
    decl!("mesh_string_contains", [Ptr, Ptr], I8),
    decl!("mesh_string_starts_with", [Ptr, Ptr], I8),
    decl!("mesh_string_ends_with", [Ptr, Ptr], I8),
    decl!("mesh_string_split", [Ptr, Ptr], Ptr),
    decl!("mesh_string_trim", [Ptr], Ptr),
    decl!("mesh_string_to_upper", [Ptr], Ptr),
    decl!("mesh_string_to_lower", [Ptr], Ptr),
    decl!("mesh_string_replace", [Ptr, Ptr, Ptr], Ptr),
    decl!("mesh_string_slice", [Ptr, I64, I64], Ptr),
    decl!("mesh_string_to_int", [Ptr], Ptr),
    // Conversions
    decl!("mesh_int_to_string", [I64], Ptr),
    decl!("mesh_float_to_string", [Double], Ptr),
    decl!("mesh_bool_to_string", [I64], Ptr),
    decl!("mesh_ptr_to_string", [Ptr], Ptr),
    decl!("mesh_int_compare", [I64, I64], I64),
    decl!("mesh_float_compare", [Double, Double], I64),
    decl!("mesh_float_bits", [Double], I64),
    decl!("mesh_int_abs", [I64], I64),
    decl!("mesh_int_to_float", [I64], Double),
    decl!("mesh_float_abs", [Double], Double),
    decl!("mesh_float_sqrt", [Double], Double),
    decl!("mesh_float_floor", [Double], Double),
    decl!("mesh_float_ceil", [Double], Double),
    decl!("mesh_float_round", [Double], I64),
    decl!("mesh_float_to_int", [Double], I64),
    decl!("mesh_float_sin", [Double], Double),
    decl!("mesh_float_cos", [Double], Double),
    decl!("mesh_float_log", [Double], Double),
    decl!("mesh_float_pow", [Double, Double], Double),
    // I/O
    decl!("mesh_println", [Ptr], Void),
    decl!("mesh_print", [Ptr], Void),
    decl!("mesh_readline", [], Ptr),
    decl!("mesh_range", [I64, I64], Ptr),
    decl!("mesh_sleep", [I64], Void),
    decl!("mesh_time_now_ms", [], I64),
    // Lists
    decl!("mesh_list_new", [I64], Ptr),
    decl!("mesh_list_push", [Ptr, I64], Ptr),
    decl!("mesh_list_get", [Ptr, I64], Ptr),
    decl!("mesh_list_nth", [Ptr, I64], I64),
    decl!("mesh_list_len", [Ptr], I64),
    decl!("mesh_list_head", [Ptr], Ptr),
    decl!("mesh_list_tail", [Ptr], Ptr),
    decl!("mesh_list_reverse", [Ptr], Ptr),
    decl!("mesh_list_sort", [Ptr], Ptr),
    decl!("mesh_list_contains", [Ptr, I64], I8),
    decl!("mesh_list_concat", [Ptr, Ptr], Ptr),
    decl!("mesh_list_zip", [Ptr, Ptr], Ptr),
    decl!("mesh_list_flat_map", [Ptr, Ptr, Ptr], Ptr),
    decl!("mesh_list_map", [Ptr, Ptr, Ptr], Ptr),
    decl!("mesh_list_filter", [Ptr, Ptr, Ptr], Ptr),
    decl!("mesh_list_fold", [Ptr, I64, Ptr, Ptr], I64),
    decl!("mesh_iter_collect", [Ptr], Ptr),
    decl!("mesh_tuple_nth", [Ptr, I64], I64),
    // Maps
    decl!("mesh_map_new", [], Ptr),
    decl!("mesh_map_new_str", [], Ptr),
    decl!("mesh_map_from_list", [Ptr], Ptr),
    decl!("mesh_map_len", [Ptr], I64),
    decl!("mesh_map_get", [Ptr, I64], Ptr),
    decl!("mesh_map_insert", [Ptr, I64, I64], Ptr),
    decl!("mesh_map_remove", [Ptr, I64], Ptr),
    decl!("mesh_map_contains_key", [Ptr, I64], I8),
    decl!("mesh_map_merge", [Ptr, Ptr], Ptr),
    decl!("mesh_map_to_list", [Ptr], Ptr),
    // Sets
    decl!("mesh_set_new", [], Ptr),
    decl!("mesh_set_from_list", [Ptr], Ptr),
    decl!("mesh_set_len", [Ptr], I64),
    decl!("mesh_set_add", [Ptr, I64], Ptr),
    decl!("mesh_set_remove", [Ptr, I64], Ptr),
    decl!("mesh_set_contains", [Ptr, I64], I8),
    decl!("mesh_set_to_list", [Ptr], Ptr),
    // Option/Result helpers
    decl!("mesh_option_is_some", [Ptr], I8),
    decl!("mesh_option_is_none", [Ptr], I8),
    decl!("mesh_option_unwrap_or", [Ptr, I64], I64),
    decl!("mesh_result_is_ok", [Ptr], I8),
    decl!("mesh_result_is_err", [Ptr], I8),
    // Actors
    decl!("mesh_rt_init", [], Void),
    decl!("mesh_rt_run", [], I64),
    decl!("mesh_actor_spawn", [Ptr, Ptr], I64),
    decl!("mesh_actor_send", [I64, I64], Void),
    decl!("mesh_actor_receive", [I64, Ptr], I8),
    decl!("mesh_actor_self", [], I64),
    decl!("mesh_panic", [Ptr], Void),
    // Servers
    decl!("mesh_http_serve", [Ptr, Ptr, I64], Void),
    decl!("mesh_ws_serve", [Ptr, Ptr, Ptr, Ptr, Ptr, Ptr, I64], Void),
    decl!(
        "mesh_ws_serve_tls",
        [Ptr, Ptr, Ptr, Ptr, Ptr, Ptr, I64, Ptr, Ptr],
        Void
    ),
    decl!("mesh_ws_send", [I64, Ptr], Void),
    decl!("mesh_ws_close", [I64], Void),
];

fn runtime_sig(name: &str) -> Option<(&'static [Slot], Slot)> {
    RUNTIME_DECLS
        .iter()
        .find(|d| d.name == name)
        .map(|d| (d.params, d.ret))
}

/// Emit a whole program's MIR as one LLVM IR module.
pub fn emit(module: &MirModule) -> String {
    let mut cg = CodeGen::new(module);
    cg.emit_module();
    cg.finish()
}

struct CodeGen<'a> {
    module: &'a MirModule,
    body: String,
    globals: String,
    tmp: usize,
    label: usize,
    strings: FxHashMap<String, String>,
    /// name -> (alloca register, type) per scope.
    locals: Vec<FxHashMap<String, (String, MirType)>>,
    /// Known function signatures (user + runtime).
    fn_sigs: FxHashMap<String, (Vec<Slot>, Slot)>,
    /// The current function's return slot, for `ret` and `Return`.
    current_ret: Slot,
    terminated: bool,
}

impl<'a> CodeGen<'a> {
    fn new(module: &'a MirModule) -> Self {
        let mut fn_sigs = FxHashMap::default();
        for d in RUNTIME_DECLS {
            fn_sigs.insert(d.name.to_string(), (d.params.to_vec(), d.ret));
        }
        for f in &module.functions {
            // Lifted closures use the word ABI: env ptr first, then one
            // i64 word per parameter, i64 result. This is what lets the
            // runtime's callback trampolines call them uniformly.
            let (params, ret) = if f.is_closure_fn {
                let mut params = vec![Slot::Ptr];
                params.extend(std::iter::repeat_n(Slot::I64, f.params.len()));
                (params, Slot::I64)
            } else {
                let params = f.params.iter().map(|(_, t)| llty(t)).collect();
                let ret = if f.return_type == MirType::Unit {
                    Slot::Void
                } else {
                    llty(&f.return_type)
                };
                (params, ret)
            };
            fn_sigs.insert(f.name.clone(), (params, ret));
        }
        CodeGen {
            module,
            body: String::new(),
            globals: String::new(),
            tmp: 0,
            label: 0,
            strings: FxHashMap::default(),
            locals: Vec::new(),
            fn_sigs,
            current_ret: Slot::Void,
            terminated: false,
        }
    }

    fn finish(self) -> String {
        let mut out = String::new();
        out.push_str("; ModuleID = 'mesh'\n\n");
        let mut category_done = false;
        for d in RUNTIME_DECLS {
            if !category_done {
                out.push_str("; Runtime declarations\n");
                category_done = true;
            }
            let params: Vec<&str> = d.params.iter().map(|p| p.ll()).collect();
            let _ = writeln!(
                out,
                "declare {} @{}({})",
                d.ret.ll(),
                d.name,
                params.join(", ")
            );
        }
        out.push('\n');
        out.push_str(&self.globals);
        out.push('\n');
        out.push_str(&self.body);
        out
    }

    // ── Helpers ─────────────────────────────────────────────────────────

    fn fresh(&mut self) -> String {
        self.tmp += 1;
        format!("%t{}", self.tmp)
    }

    fn fresh_label(&mut self, prefix: &str) -> String {
        self.label += 1;
        format!("{prefix}{}", self.label)
    }

    fn line(&mut self, s: &str) {
        self.body.push_str("  ");
        self.body.push_str(s);
        self.body.push('\n');
    }

    fn start_block(&mut self, label: &str) {
        let _ = writeln!(self.body, "{label}:");
        self.terminated = false;
    }

    fn string_const(&mut self, text: &str) -> String {
        if let Some(existing) = self.strings.get(text) {
            return existing.clone();
        }
        let name = format!("@.str.{}", self.strings.len());
        let bytes = text.as_bytes();
        let mut escaped = String::new();
        for &b in bytes {
            if (0x20..0x7f).contains(&b) && b != b'"' && b != b'\\' {
                escaped.push(b as char);
            } else {
                let _ = write!(escaped, "\\{b:02X}");
            }
        }
        let _ = writeln!(
            self.globals,
            "{name} = private unnamed_addr constant <{{ i64, [{len} x i8] }}> <{{ i64 {len}, c\"{escaped}\" }}>",
            len = bytes.len(),
        );
        self.strings.insert(text.to_string(), name.clone());
        name
    }

    fn lookup_local(&self, name: &str) -> Option<(String, MirType)> {
        self.locals.iter().rev().find_map(|s| s.get(name)).cloned()
    }

    fn bind_local(&mut self, name: &str, slot: String, ty: MirType) {
        self.locals
            .last_mut()
            .expect("scope stack")
            .insert(name.to_string(), (slot, ty));
    }

    /// Convert a typed value to the requested LLVM slot type.
    fn coerce(&mut self, value: String, from: Slot, to: Slot) -> String {
        if from == to || to == Slot::Void {
            return value;
        }
        let out = self.fresh();
        let instr = match (from, to) {
            (Slot::I1, Slot::I64) => format!("{out} = zext i1 {value} to i64"),
            (Slot::I1, Slot::I8) => format!("{out} = zext i1 {value} to i8"),
            (Slot::I8, Slot::I64) => format!("{out} = zext i8 {value} to i64"),
            (Slot::I8, Slot::I1) => format!("{out} = icmp ne i8 {value}, 0"),
            (Slot::I64, Slot::I1) => format!("{out} = icmp ne i64 {value}, 0"),
            (Slot::I64, Slot::I8) => format!("{out} = trunc i64 {value} to i8"),
            (Slot::Double, Slot::I64) => format!("{out} = bitcast double {value} to i64"),
            (Slot::I64, Slot::Double) => format!("{out} = bitcast i64 {value} to double"),
            (Slot::Ptr, Slot::I64) => format!("{out} = ptrtoint ptr {value} to i64"),
            (Slot::I64, Slot::Ptr) => format!("{out} = inttoptr i64 {value} to ptr"),
            (Slot::Void, _) => return "0".to_string(),
            (a, b) => {
                // Route the remaining pairs through i64.
                let mid = self.coerce(value, a, Slot::I64);
                return self.coerce(mid, Slot::I64, b);
            }
        };
        self.line(&instr);
        out
    }

    /// A value as an i64 heap-slot word.
    fn to_word(&mut self, value: String, ty: &MirType) -> String {
        self.coerce(value, llty(ty), Slot::I64)
    }

    /// Emit an expression and coerce the result to a pointer; erased
    /// heap values can surface as i64 words.
    fn emit_as_ptr(&mut self, expr: &MirExpr) -> String {
        let (value, ty) = self.emit_expr(expr);
        self.coerce(value, llty(&ty), Slot::Ptr)
    }

    fn from_word(&mut self, value: String, ty: &MirType) -> String {
        self.coerce(value, Slot::I64, llty(ty))
    }

    /// Allocate a heap object of `slots` i64 words in the current
    /// actor's arena.
    fn alloc_slots(&mut self, slots: usize) -> String {
        let out = self.fresh();
        self.line(&format!(
            "{out} = call ptr @mesh_gc_alloc_actor(i64 {}, i64 8)",
            slots * 8
        ));
        out
    }

    fn store_slot(&mut self, base: &str, index: usize, word: &str) {
        let gep = self.fresh();
        self.line(&format!("{gep} = getelementptr i64, ptr {base}, i64 {index}"));
        self.line(&format!("store i64 {word}, ptr {gep}"));
    }

    fn load_slot(&mut self, base: &str, index: usize) -> String {
        let gep = self.fresh();
        self.line(&format!("{gep} = getelementptr i64, ptr {base}, i64 {index}"));
        let out = self.fresh();
        self.line(&format!("{out} = load i64, ptr {gep}"));
        out
    }

    // ── Module / function emission ──────────────────────────────────────

    fn emit_module(&mut self) {
        let functions = self.module.functions.clone();
        for f in &functions {
            self.emit_function(f);
        }
        if let Some(entry) = self.module.entry_function.clone() {
            self.emit_entry(&entry);
        }
    }

    fn emit_function(&mut self, f: &MirFunction) {
        self.tmp = 0;
        self.label = 0;
        self.locals.clear();
        self.locals.push(FxHashMap::default());
        self.terminated = false;

        let (param_slots, ret_slot) = self
            .fn_sigs
            .get(&f.name)
            .cloned()
            .expect("every emitted function is registered");
        self.current_ret = ret_slot;

        let mut sig_params = Vec::new();
        if f.is_closure_fn {
            sig_params.push(("__env".to_string(), MirType::Ptr));
        }
        sig_params.extend(f.params.iter().cloned());

        let params_src: Vec<String> = param_slots
            .iter()
            .enumerate()
            .map(|(i, slot)| format!("{} %arg{i}", slot.ll()))
            .collect();
        let _ = writeln!(
            self.body,
            "define {} @{}({}) {{",
            ret_slot.ll(),
            f.name,
            params_src.join(", ")
        );
        self.start_block("entry");

        // Every parameter gets a stack slot of its MIR type; word-ABI
        // arguments convert on entry.
        for (i, (name, ty)) in sig_params.iter().enumerate() {
            let incoming_slot = param_slots.get(i).copied().unwrap_or(llty(ty));
            let value = self.coerce(format!("%arg{i}"), incoming_slot, llty(ty));
            let slot = self.fresh();
            self.line(&format!("{slot} = alloca {}", llty(ty).ll()));
            self.line(&format!("store {} {value}, ptr {slot}", llty(ty).ll()));
            self.bind_local(name, slot, ty.clone());
        }

        let (value, value_ty) = self.emit_expr(&f.body);
        if !self.terminated {
            if ret_slot == Slot::Void {
                self.line("ret void");
            } else {
                let coerced = self.coerce(value, llty(&value_ty), ret_slot);
                self.line(&format!("ret {} {coerced}", ret_slot.ll()));
            }
        }
        self.body.push_str("}\n\n");
    }

    /// The process entry point: init the runtime, spawn the root actor
    /// running the entry module's `main`, and drive the scheduler.
    fn emit_entry(&mut self, entry_fn: &str) {
        let root = "__mesh_root";
        let ret = self
            .fn_sigs
            .get(entry_fn)
            .map(|(_, r)| *r)
            .unwrap_or(Slot::Void);
        let _ = writeln!(self.body, "define void @{root}(ptr %args) {{");
        self.start_block("entry");
        if ret == Slot::Void {
            self.line(&format!("call void @{entry_fn}()"));
        } else {
            let tmp = self.fresh();
            self.line(&format!("{tmp} = call {} @{entry_fn}()", ret.ll()));
        }
        self.line("ret void");
        self.body.push_str("}\n\n");

        let _ = writeln!(self.body, "define i32 @main() {{");
        self.start_block("entry");
        self.line("call void @mesh_rt_init()");
        let pid = self.fresh();
        self.line(&format!(
            "{pid} = call i64 @mesh_actor_spawn(ptr @{root}, ptr null)"
        ));
        let code = self.fresh();
        self.line(&format!("{code} = call i64 @mesh_rt_run()"));
        let trunc = self.fresh();
        self.line(&format!("{trunc} = trunc i64 {code} to i32"));
        self.line(&format!("ret i32 {trunc}"));
        self.body.push_str("}\n\n");
    }

    // ── Expressions ─────────────────────────────────────────────────────

    /// Emit one expression; returns the value register (or literal) and
    /// its MIR type. After a diverging expression `self.terminated` is
    /// set and the value is a placeholder.
    fn emit_expr(&mut self, expr: &MirExpr) -> (String, MirType) {
        match expr {
            MirExpr::Lit(lit, ty) => (self.emit_lit(lit), ty.clone()),
            MirExpr::Unit => ("0".to_string(), MirType::Unit),
            MirExpr::Var(name, ty) => {
                if let Some((slot, var_ty)) = self.lookup_local(name) {
                    let out = self.fresh();
                    self.line(&format!("{out} = load {}, ptr {slot}", llty(&var_ty).ll()));
                    (out, var_ty)
                } else {
                    // Unbound names are function references.
                    (format!("@{name}"), ty.clone())
                }
            }
            MirExpr::FnRef(name, ty) => (format!("@{name}"), ty.clone()),
            MirExpr::Let { name, ty, value } => {
                let (v, v_ty) = self.emit_expr(value);
                if !self.terminated {
                    let coerced = self.coerce(v, llty(&v_ty), llty(ty));
                    let slot = self.fresh();
                    self.line(&format!("{slot} = alloca {}", llty(ty).ll()));
                    self.line(&format!("store {} {coerced}, ptr {slot}", llty(ty).ll()));
                    self.bind_local(name, slot, ty.clone());
                }
                ("0".to_string(), MirType::Unit)
            }
            MirExpr::Block(stmts, ty) => {
                self.locals.push(FxHashMap::default());
                let mut last = ("0".to_string(), MirType::Unit);
                for stmt in stmts {
                    if self.terminated {
                        break;
                    }
                    last = self.emit_expr(stmt);
                }
                self.locals.pop();
                let _ = ty;
                last
            }
            MirExpr::BinOp { op, lhs, rhs, ty } => self.emit_binop(*op, lhs, rhs, ty),
            MirExpr::UnaryOp { op, operand, ty } => {
                let (v, v_ty) = self.emit_expr(operand);
                let out = self.fresh();
                match op {
                    UnaryOp::Not => {
                        let b = self.coerce(v, llty(&v_ty), Slot::I1);
                        self.line(&format!("{out} = xor i1 {b}, true"));
                        (out, MirType::Bool)
                    }
                    UnaryOp::Neg => match llty(&v_ty) {
                        Slot::Double => {
                            self.line(&format!("{out} = fneg double {v}"));
                            (out, MirType::Float)
                        }
                        _ => {
                            self.line(&format!("{out} = sub i64 0, {v}"));
                            (out, MirType::Int)
                        }
                    },
                }
            }
            MirExpr::Call { func, args, ty } => self.emit_call(func, args, ty),
            MirExpr::ClosureCall { closure, args, ty } => {
                // Closure values are `{fn_ptr, env}` pairs; the callee
                // uses the word ABI with the env as extra first
                // parameter.
                let pair = self.emit_as_ptr(closure);
                let fn_word = self.load_slot(&pair, 0);
                let fn_ptr = self.coerce(fn_word, Slot::I64, Slot::Ptr);
                let env_word = self.load_slot(&pair, 1);
                let env_ptr = self.coerce(env_word, Slot::I64, Slot::Ptr);
                let mut arg_list = vec![format!("ptr {env_ptr}")];
                for a in args {
                    let (v, v_ty) = self.emit_expr(a);
                    let word = self.to_word(v, &v_ty);
                    arg_list.push(format!("i64 {word}"));
                }
                let out = self.fresh();
                self.line(&format!(
                    "{out} = call i64 {fn_ptr}({})",
                    arg_list.join(", ")
                ));
                let value = self.from_word(out, ty);
                (value, ty.clone())
            }
            MirExpr::If {
                cond,
                then_body,
                else_body,
                ty,
            } => self.emit_if(cond, then_body, else_body, ty),
            MirExpr::Switch {
                scrutinee,
                cases,
                default,
                ty,
            } => self.emit_switch(scrutinee, cases, default.as_deref(), ty),
            MirExpr::StructLit { fields, ty, .. } => {
                let base = self.alloc_slots(fields.len().max(1));
                for (i, f) in fields.iter().enumerate() {
                    let (v, v_ty) = self.emit_expr(f);
                    let word = self.to_word(v, &v_ty);
                    self.store_slot(&base, i, &word);
                }
                (base, ty.clone())
            }
            MirExpr::FieldAccess { object, index, ty } => {
                let base = self.emit_as_ptr(object);
                let word = self.load_slot(&base, *index);
                let v = self.from_word(word, ty);
                (v, ty.clone())
            }
            MirExpr::ConstructVariant { tag, fields, ty, .. } => {
                let base = self.alloc_slots(fields.len() + 1);
                self.store_slot(&base, 0, &tag.to_string());
                for (i, f) in fields.iter().enumerate() {
                    let (v, v_ty) = self.emit_expr(f);
                    let word = self.to_word(v, &v_ty);
                    self.store_slot(&base, i + 1, &word);
                }
                (base, ty.clone())
            }
            MirExpr::GetTag { object } => {
                let base = self.emit_as_ptr(object);
                (self.load_slot(&base, 0), MirType::Int)
            }
            MirExpr::VariantField { object, index, ty } => {
                let base = self.emit_as_ptr(object);
                let word = self.load_slot(&base, index + 1);
                let v = self.from_word(word, ty);
                (v, ty.clone())
            }
            MirExpr::Tuple { items, ty } => {
                // { u64 len, u64 elements[N] }, the layout tuple_nth
                // expects.
                let base = self.alloc_slots(items.len() + 1);
                self.store_slot(&base, 0, &items.len().to_string());
                for (i, item) in items.iter().enumerate() {
                    let (v, v_ty) = self.emit_expr(item);
                    let word = self.to_word(v, &v_ty);
                    self.store_slot(&base, i + 1, &word);
                }
                (base, ty.clone())
            }
            MirExpr::TupleField { object, index, ty } => {
                let base = self.emit_as_ptr(object);
                let word = self.load_slot(&base, index + 1);
                let v = self.from_word(word, ty);
                (v, ty.clone())
            }
            MirExpr::ListLit { items, ty } => {
                let mut list = self.fresh();
                self.line(&format!(
                    "{list} = call ptr @mesh_list_new(i64 {})",
                    items.len()
                ));
                for item in items {
                    let (v, v_ty) = self.emit_expr(item);
                    let word = self.to_word(v, &v_ty);
                    let next = self.fresh();
                    self.line(&format!(
                        "{next} = call ptr @mesh_list_push(ptr {list}, i64 {word})"
                    ));
                    list = next;
                }
                (list, ty.clone())
            }
            MirExpr::ForIn {
                binding,
                binding_ty,
                kind,
                iterable,
                filter,
                body,
            } => self.emit_for(binding, binding_ty, *kind, iterable, filter.as_deref(), body),
            MirExpr::MakeClosure { fn_name, captures, ty } => {
                let pair = self.alloc_slots(2);
                let fn_word = {
                    let out = self.fresh();
                    self.line(&format!("{out} = ptrtoint ptr @{fn_name} to i64"));
                    out
                };
                self.store_slot(&pair, 0, &fn_word);
                if captures.is_empty() {
                    self.store_slot(&pair, 1, "0");
                } else {
                    let env = self.alloc_slots(captures.len() + 1);
                    self.store_slot(&env, 0, &captures.len().to_string());
                    for (i, c) in captures.iter().enumerate() {
                        let (v, v_ty) = self.emit_expr(c);
                        let word = self.to_word(v, &v_ty);
                        self.store_slot(&env, i + 1, &word);
                    }
                    let env_word = self.coerce(env, Slot::Ptr, Slot::I64);
                    self.store_slot(&pair, 1, &env_word);
                }
                (pair, ty.clone())
            }
            MirExpr::ActorSpawn { wrapper, args, ty } => {
                let packed = if args.is_empty() {
                    "null".to_string()
                } else {
                    let base = self.alloc_slots(args.len() + 1);
                    self.store_slot(&base, 0, &args.len().to_string());
                    for (i, a) in args.iter().enumerate() {
                        let (v, v_ty) = self.emit_expr(a);
                        let word = self.to_word(v, &v_ty);
                        self.store_slot(&base, i + 1, &word);
                    }
                    base
                };
                let out = self.fresh();
                self.line(&format!(
                    "{out} = call i64 @mesh_actor_spawn(ptr @{wrapper}, ptr {packed})"
                ));
                (out, ty.clone())
            }
            MirExpr::ActorSend { target, message } => {
                let (pid, pid_ty) = self.emit_expr(target);
                let pid = self.coerce(pid, llty(&pid_ty), Slot::I64);
                let (msg, msg_ty) = self.emit_expr(message);
                let word = self.to_word(msg, &msg_ty);
                self.line(&format!("call void @mesh_actor_send(i64 {pid}, i64 {word})"));
                ("0".to_string(), MirType::Unit)
            }
            MirExpr::ActorReceive {
                binding,
                dispatch,
                timeout,
                ty,
            } => self.emit_receive(binding, dispatch, timeout.as_ref(), ty),
            MirExpr::Return(value) => {
                let (v, v_ty) = self.emit_expr(value);
                if !self.terminated {
                    if self.current_ret == Slot::Void {
                        self.line("ret void");
                    } else {
                        let ret_slot = self.current_ret;
                        let coerced = self.coerce(v, llty(&v_ty), ret_slot);
                        self.line(&format!("ret {} {coerced}", ret_slot.ll()));
                    }
                    self.terminated = true;
                }
                ("0".to_string(), MirType::Unit)
            }
            MirExpr::Panic { message } => {
                let msg = self.string_const(message);
                self.line(&format!("call void @mesh_panic(ptr {msg})"));
                self.line("unreachable");
                self.terminated = true;
                ("0".to_string(), MirType::Unit)
            }
        }
    }

    fn emit_lit(&mut self, lit: &MirLiteral) -> String {
        match lit {
            MirLiteral::Int(v) => v.to_string(),
            MirLiteral::Float(v) => format!("0x{:016X}", v.to_bits()),
            MirLiteral::Bool(v) => if *v { "true" } else { "false" }.to_string(),
            MirLiteral::String(s) => self.string_const(s),
            MirLiteral::Unit => "0".to_string(),
        }
    }

    fn emit_binop(
        &mut self,
        op: BinOp,
        lhs: &MirExpr,
        rhs: &MirExpr,
        ty: &MirType,
    ) -> (String, MirType) {
        let (a, a_ty) = self.emit_expr(lhs);
        let (b, b_ty) = self.emit_expr(rhs);
        let operand_slot = llty(&a_ty);
        let b = self.coerce(b, llty(&b_ty), operand_slot);
        let out = self.fresh();
        let is_float = operand_slot == Slot::Double;

        let instr = match op {
            BinOp::Add if is_float => format!("{out} = fadd double {a}, {b}"),
            BinOp::Sub if is_float => format!("{out} = fsub double {a}, {b}"),
            BinOp::Mul if is_float => format!("{out} = fmul double {a}, {b}"),
            BinOp::Div if is_float => format!("{out} = fdiv double {a}, {b}"),
            BinOp::Add => format!("{out} = add i64 {a}, {b}"),
            BinOp::Sub => format!("{out} = sub i64 {a}, {b}"),
            BinOp::Mul => format!("{out} = mul i64 {a}, {b}"),
            BinOp::Div => format!("{out} = sdiv i64 {a}, {b}"),
            BinOp::Mod => format!("{out} = srem i64 {a}, {b}"),
            BinOp::BitXor => format!("{out} = xor i64 {a}, {b}"),
            BinOp::And => format!("{out} = and i1 {a}, {b}"),
            BinOp::Or => format!("{out} = or i1 {a}, {b}"),
            BinOp::Eq | BinOp::NotEq | BinOp::Lt | BinOp::Gt | BinOp::LtEq | BinOp::GtEq => {
                let pred = if is_float {
                    match op {
                        BinOp::Eq => "oeq",
                        BinOp::NotEq => "one",
                        BinOp::Lt => "olt",
                        BinOp::Gt => "ogt",
                        BinOp::LtEq => "ole",
                        _ => "oge",
                    }
                } else {
                    match op {
                        BinOp::Eq => "eq",
                        BinOp::NotEq => "ne",
                        BinOp::Lt => "slt",
                        BinOp::Gt => "sgt",
                        BinOp::LtEq => "sle",
                        _ => "sge",
                    }
                };
                if is_float {
                    format!("{out} = fcmp {pred} double {a}, {b}")
                } else if operand_slot == Slot::Ptr {
                    format!("{out} = icmp {pred} ptr {a}, {b}")
                } else {
                    let width = operand_slot.ll();
                    format!("{out} = icmp {pred} {width} {a}, {b}")
                }
            }
        };
        self.line(&instr);
        (out, ty.clone())
    }

    fn emit_call(&mut self, func: &MirExpr, args: &[MirExpr], ty: &MirType) -> (String, MirType) {
        let symbol = match func {
            MirExpr::Var(name, _) | MirExpr::FnRef(name, _) => name.clone(),
            other => {
                // Indirect call through a bare function pointer value.
                let (f, _) = self.emit_expr(other);
                let mut arg_list = Vec::new();
                for a in args {
                    let (v, v_ty) = self.emit_expr(a);
                    arg_list.push(format!("{} {v}", llty(&v_ty).ll()));
                }
                let out = self.fresh();
                self.line(&format!(
                    "{out} = call {} {f}({})",
                    llty(ty).ll(),
                    arg_list.join(", ")
                ));
                return (out, ty.clone());
            }
        };

        // A local variable shadowing the symbol means a closure value.
        if self.lookup_local(&symbol).is_some() {
            return self.emit_expr(&MirExpr::ClosureCall {
                closure: Box::new(MirExpr::Var(symbol, MirType::Ptr)),
                args: args.to_vec(),
                ty: ty.clone(),
            });
        }

        let (param_slots, ret_slot) = self
            .fn_sigs
            .get(&symbol)
            .cloned()
            .unwrap_or_else(|| {
                (
                    args.iter().map(|a| llty(&a.ty())).collect(),
                    if *ty == MirType::Unit { Slot::Void } else { llty(ty) },
                )
            });

        let mut arg_list = Vec::new();
        for (i, a) in args.iter().enumerate() {
            let (v, v_ty) = self.emit_expr(a);
            let target = param_slots.get(i).copied().unwrap_or(llty(&v_ty));
            let coerced = self.coerce(v, llty(&v_ty), target);
            arg_list.push(format!("{} {coerced}", target.ll()));
        }

        if ret_slot == Slot::Void {
            self.line(&format!("call void @{symbol}({})", arg_list.join(", ")));
            ("0".to_string(), MirType::Unit)
        } else {
            let out = self.fresh();
            self.line(&format!(
                "{out} = call {} @{symbol}({})",
                ret_slot.ll(),
                arg_list.join(", ")
            ));
            let coerced = self.coerce(out, ret_slot, llty(ty));
            (coerced, ty.clone())
        }
    }

    fn emit_if(
        &mut self,
        cond: &MirExpr,
        then_body: &MirExpr,
        else_body: &MirExpr,
        ty: &MirType,
    ) -> (String, MirType) {
        let (c, c_ty) = self.emit_expr(cond);
        let c = self.coerce(c, llty(&c_ty), Slot::I1);
        let then_label = self.fresh_label("then");
        let else_label = self.fresh_label("else");
        let merge_label = self.fresh_label("merge");
        let has_value = *ty != MirType::Unit;
        let result_slot = if has_value {
            let slot = self.fresh();
            self.line(&format!("{slot} = alloca {}", llty(ty).ll()));
            Some(slot)
        } else {
            None
        };

        self.line(&format!("br i1 {c}, label %{then_label}, label %{else_label}"));

        self.start_block(&then_label);
        let (tv, tv_ty) = self.emit_expr(then_body);
        if !self.terminated {
            if let Some(slot) = &result_slot {
                let coerced = self.coerce(tv, llty(&tv_ty), llty(ty));
                self.line(&format!("store {} {coerced}, ptr {slot}", llty(ty).ll()));
            }
            self.line(&format!("br label %{merge_label}"));
        }

        self.start_block(&else_label);
        let (ev, ev_ty) = self.emit_expr(else_body);
        if !self.terminated {
            if let Some(slot) = &result_slot {
                let coerced = self.coerce(ev, llty(&ev_ty), llty(ty));
                self.line(&format!("store {} {coerced}, ptr {slot}", llty(ty).ll()));
            }
            self.line(&format!("br label %{merge_label}"));
        }

        self.start_block(&merge_label);
        match result_slot {
            Some(slot) => {
                let out = self.fresh();
                self.line(&format!("{out} = load {}, ptr {slot}", llty(ty).ll()));
                (out, ty.clone())
            }
            None => ("0".to_string(), MirType::Unit),
        }
    }

    fn emit_switch(
        &mut self,
        scrutinee: &MirExpr,
        cases: &[(i64, MirExpr)],
        default: Option<&MirExpr>,
        ty: &MirType,
    ) -> (String, MirType) {
        let (s, s_ty) = self.emit_expr(scrutinee);
        let s = self.coerce(s, llty(&s_ty), Slot::I64);
        let merge_label = self.fresh_label("swmerge");
        let default_label = self.fresh_label("swdefault");
        let has_value = *ty != MirType::Unit;
        let result_slot = if has_value {
            let slot = self.fresh();
            self.line(&format!("{slot} = alloca {}", llty(ty).ll()));
            Some(slot)
        } else {
            None
        };

        let case_labels: Vec<String> = cases
            .iter()
            .map(|_| self.fresh_label("swcase"))
            .collect();
        let table: Vec<String> = cases
            .iter()
            .zip(&case_labels)
            .map(|((tag, _), label)| format!("i64 {tag}, label %{label}"))
            .collect();
        self.line(&format!(
            "switch i64 {s}, label %{default_label} [ {} ]",
            table.join(" ")
        ));

        for ((_, body), label) in cases.iter().zip(&case_labels) {
            self.start_block(label);
            let (v, v_ty) = self.emit_expr(body);
            if !self.terminated {
                if let Some(slot) = &result_slot {
                    let coerced = self.coerce(v, llty(&v_ty), llty(ty));
                    self.line(&format!("store {} {coerced}, ptr {slot}", llty(ty).ll()));
                }
                self.line(&format!("br label %{merge_label}"));
            }
        }

        self.start_block(&default_label);
        match default {
            Some(d) => {
                let (v, v_ty) = self.emit_expr(d);
                if !self.terminated {
                    if let Some(slot) = &result_slot {
                        let coerced = self.coerce(v, llty(&v_ty), llty(ty));
                        self.line(&format!("store {} {coerced}, ptr {slot}", llty(ty).ll()));
                    }
                    self.line(&format!("br label %{merge_label}"));
                }
            }
            None => {
                self.line("unreachable");
                self.terminated = true;
            }
        }

        self.start_block(&merge_label);
        match result_slot {
            Some(slot) => {
                let out = self.fresh();
                self.line(&format!("{out} = load {}, ptr {slot}", llty(ty).ll()));
                (out, ty.clone())
            }
            None => ("0".to_string(), MirType::Unit),
        }
    }

    /// `for` loops: header -> body -> (filter-true-body ->) latch ->
    /// header, with a merge block after. The filter adds the fifth
    /// block; without one the shape collapses to four.
    fn emit_for(
        &mut self,
        binding: &str,
        binding_ty: &MirType,
        kind: ForKind,
        iterable: &MirExpr,
        filter: Option<&MirExpr>,
        body: &MirExpr,
    ) -> (String, MirType) {
        let iter_v = self.emit_as_ptr(iterable);

        // Normalize map/set iteration to list iteration.
        let (list, start, end) = match kind {
            ForKind::Range => {
                let start = self.load_slot(&iter_v, 1);
                let end = self.load_slot(&iter_v, 2);
                (None, start, end)
            }
            ForKind::List => {
                let len = self.fresh();
                self.line(&format!("{len} = call i64 @mesh_list_len(ptr {iter_v})"));
                (Some(iter_v), "0".to_string(), len)
            }
            ForKind::Map => {
                let l = self.fresh();
                self.line(&format!("{l} = call ptr @mesh_map_to_list(ptr {iter_v})"));
                let len = self.fresh();
                self.line(&format!("{len} = call i64 @mesh_list_len(ptr {l})"));
                (Some(l), "0".to_string(), len)
            }
            ForKind::Set => {
                let l = self.fresh();
                self.line(&format!("{l} = call ptr @mesh_set_to_list(ptr {iter_v})"));
                let len = self.fresh();
                self.line(&format!("{len} = call i64 @mesh_list_len(ptr {l})"));
                (Some(l), "0".to_string(), len)
            }
        };

        let idx_slot = self.fresh();
        self.line(&format!("{idx_slot} = alloca i64"));
        self.line(&format!("store i64 {start}, ptr {idx_slot}"));

        let header = self.fresh_label("for_header");
        let body_label = self.fresh_label("for_body");
        let filter_body = filter.map(|_| self.fresh_label("for_filter_body"));
        let latch = self.fresh_label("for_latch");
        let merge = self.fresh_label("for_merge");

        self.line(&format!("br label %{header}"));
        self.start_block(&header);
        let idx = self.fresh();
        self.line(&format!("{idx} = load i64, ptr {idx_slot}"));
        let cmp = self.fresh();
        self.line(&format!("{cmp} = icmp slt i64 {idx}, {end}"));
        self.line(&format!("br i1 {cmp}, label %{body_label}, label %{merge}"));

        self.start_block(&body_label);
        self.locals.push(FxHashMap::default());
        // Bind the loop variable.
        let elem = match &list {
            None => idx.clone(),
            Some(l) => {
                let word = self.fresh();
                self.line(&format!(
                    "{word} = call i64 @mesh_list_nth(ptr {l}, i64 {idx})"
                ));
                word
            }
        };
        let elem_val = self.from_word(elem, binding_ty);
        let bind_slot = self.fresh();
        self.line(&format!("{bind_slot} = alloca {}", llty(binding_ty).ll()));
        self.line(&format!(
            "store {} {elem_val}, ptr {bind_slot}",
            llty(binding_ty).ll()
        ));
        self.bind_local(binding, bind_slot, binding_ty.clone());

        match (filter, &filter_body) {
            (Some(f), Some(fb_label)) => {
                let (fv, fv_ty) = self.emit_expr(f);
                let fv = self.coerce(fv, llty(&fv_ty), Slot::I1);
                self.line(&format!("br i1 {fv}, label %{fb_label}, label %{latch}"));
                self.start_block(fb_label);
                self.emit_expr(body);
                if !self.terminated {
                    self.line(&format!("br label %{latch}"));
                }
            }
            _ => {
                self.emit_expr(body);
                if !self.terminated {
                    self.line(&format!("br label %{latch}"));
                }
            }
        }
        self.locals.pop();

        self.start_block(&latch);
        let next = self.fresh();
        self.line(&format!("{next} = add i64 {idx}, 1"));
        self.line(&format!("store i64 {next}, ptr {idx_slot}"));
        self.line(&format!("br label %{header}"));

        self.start_block(&merge);
        ("0".to_string(), MirType::Unit)
    }

    fn emit_receive(
        &mut self,
        binding: &str,
        dispatch: &MirExpr,
        timeout: Option<&(Box<MirExpr>, Box<MirExpr>)>,
        ty: &MirType,
    ) -> (String, MirType) {
        let out_slot = self.fresh();
        self.line(&format!("{out_slot} = alloca i64"));

        let timeout_ms = match timeout {
            Some((ms, _)) => {
                let (v, v_ty) = self.emit_expr(ms);
                self.coerce(v, llty(&v_ty), Slot::I64)
            }
            None => "-1".to_string(),
        };
        let got = self.fresh();
        self.line(&format!(
            "{got} = call i8 @mesh_actor_receive(i64 {timeout_ms}, ptr {out_slot})"
        ));

        let has_value = *ty != MirType::Unit;
        let result_slot = if has_value {
            let slot = self.fresh();
            self.line(&format!("{slot} = alloca {}", llty(ty).ll()));
            Some(slot)
        } else {
            None
        };

        let msg_label = self.fresh_label("recv_msg");
        let merge_label = self.fresh_label("recv_merge");
        let timeout_label = timeout.map(|_| self.fresh_label("recv_timeout"));

        let flag = self.fresh();
        self.line(&format!("{flag} = icmp ne i8 {got}, 0"));
        match &timeout_label {
            Some(tl) => {
                self.line(&format!("br i1 {flag}, label %{msg_label}, label %{tl}"))
            }
            None => self.line(&format!(
                "br i1 {flag}, label %{msg_label}, label %{merge_label}"
            )),
        }

        self.start_block(&msg_label);
        self.locals.push(FxHashMap::default());
        // Bind the received word so the compiled arm dispatch can see it.
        self.bind_local(binding, out_slot.clone(), MirType::Int);
        let (v, v_ty) = self.emit_expr(dispatch);
        if !self.terminated {
            if let Some(slot) = &result_slot {
                let coerced = self.coerce(v, llty(&v_ty), llty(ty));
                self.line(&format!("store {} {coerced}, ptr {slot}", llty(ty).ll()));
            }
            self.line(&format!("br label %{merge_label}"));
        }
        self.locals.pop();

        if let (Some(tl), Some((_, body))) = (&timeout_label, timeout) {
            self.start_block(tl);
            let (v, v_ty) = self.emit_expr(body);
            if !self.terminated {
                if let Some(slot) = &result_slot {
                    let coerced = self.coerce(v, llty(&v_ty), llty(ty));
                    self.line(&format!("store {} {coerced}, ptr {slot}", llty(ty).ll()));
                }
                self.line(&format!("br label %{merge_label}"));
            }
        }

        self.start_block(&merge_label);
        match result_slot {
            Some(slot) => {
                let out = self.fresh();
                self.line(&format!("{out} = load {}, ptr {slot}", llty(ty).ll()));
                (out, ty.clone())
            }
            None => ("0".to_string(), MirType::Unit),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mir::{MirLiteral, MirStructDef};

    fn simple_fn(body: MirExpr, ret: MirType) -> MirModule {
        MirModule {
            functions: vec![MirFunction {
                name: "Main__f".into(),
                params: vec![],
                return_type: ret,
                body,
                is_closure_fn: false,
                captures: vec![],
            }],
            structs: vec![],
            sum_types: vec![],
            entry_function: None,
        }
    }

    #[test]
    fn declares_runtime_symbols_once() {
        let ir = emit(&simple_fn(MirExpr::Unit, MirType::Unit));
        assert!(ir.contains("declare ptr @mesh_gc_alloc_actor(i64, i64)"));
        assert!(ir.contains("declare i8 @mesh_string_eq(ptr, ptr)"));
        assert!(ir.contains("declare ptr @mesh_list_zip(ptr, ptr)"));
        assert!(
            ir.contains("declare void @mesh_ws_serve_tls(ptr, ptr, ptr, ptr, ptr, ptr, i64, ptr, ptr)")
        );
    }

    #[test]
    fn string_literals_are_length_prefixed_globals() {
        let body = MirExpr::Lit(MirLiteral::String("hi".into()), MirType::String);
        let ir = emit(&simple_fn(body, MirType::String));
        assert!(ir.contains("i64 2, c\"hi\""), "{ir}");
    }

    #[test]
    fn string_eq_result_converts_to_i1() {
        let body = crate::mir::lower::rt_call(
            "mesh_string_eq",
            vec![
                MirExpr::Lit(MirLiteral::String("a".into()), MirType::String),
                MirExpr::Lit(MirLiteral::String("b".into()), MirType::String),
            ],
            MirType::Bool,
        );
        let ir = emit(&simple_fn(body, MirType::Bool));
        assert!(ir.contains("call i8 @mesh_string_eq"));
        assert!(ir.contains("icmp ne i8"), "{ir}");
    }

    #[test]
    fn tuple_layout_stores_length_header() {
        let body = MirExpr::Tuple {
            items: vec![
                MirExpr::Lit(MirLiteral::Int(1), MirType::Int),
                MirExpr::Lit(MirLiteral::Int(2), MirType::Int),
            ],
            ty: MirType::Tuple(vec![MirType::Int, MirType::Int]),
        };
        let ir = emit(&simple_fn(body, MirType::Tuple(vec![MirType::Int, MirType::Int])));
        // Three slots: len + 2 elements, allocated through the actor
        // arena.
        assert!(ir.contains("call ptr @mesh_gc_alloc_actor(i64 24, i64 8)"), "{ir}");
        assert!(ir.contains("store i64 2, ptr"), "{ir}");
    }

    #[test]
    fn entry_module_gets_main_wrapper() {
        let mut module = simple_fn(MirExpr::Unit, MirType::Unit);
        module.functions[0].name = "Main__main".into();
        module.entry_function = Some("Main__main".into());
        let ir = emit(&module);
        assert!(ir.contains("define i32 @main()"));
        assert!(ir.contains("call void @mesh_rt_init()"));
        assert!(ir.contains("call i64 @mesh_actor_spawn(ptr @__mesh_root, ptr null)"));
        assert!(ir.contains("call i64 @mesh_rt_run()"));
    }

    #[test]
    fn struct_fields_use_slot_layout() {
        let module = MirModule {
            functions: vec![MirFunction {
                name: "Main__mk".into(),
                params: vec![],
                return_type: MirType::Struct("Point".into()),
                body: MirExpr::StructLit {
                    name: "Point".into(),
                    fields: vec![
                        MirExpr::Lit(MirLiteral::Int(10), MirType::Int),
                        MirExpr::Lit(MirLiteral::Int(20), MirType::Int),
                    ],
                    ty: MirType::Struct("Point".into()),
                },
                is_closure_fn: false,
                captures: vec![],
            }],
            structs: vec![MirStructDef {
                name: "Point".into(),
                fields: vec![("x".into(), MirType::Int), ("y".into(), MirType::Int)],
            }],
            sum_types: vec![],
            entry_function: None,
        };
        let ir = emit(&module);
        assert!(ir.contains("call ptr @mesh_gc_alloc_actor(i64 16, i64 8)"), "{ir}");
    }
}
