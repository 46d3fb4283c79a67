//! Variable and parameter storage: a stack of scopes over a global layer.

use crate::ast::CompiledStylesheet;
use folio_dom::Document;
use folio_xpath1::{EvalContext, Value, VariableResolver, evaluate};
use std::collections::HashMap;

/// Scoped variable bindings. Globals live below the scope stack and are
/// never popped; local scopes are pushed lazily by template bodies and
/// `call-template` parameter lists.
///
/// A frame marker separates template invocations: lookups see only the
/// scopes of the current frame plus the globals, so a called template is
/// never handed the caller's local variables by accident.
#[derive(Default)]
pub struct VariableStack {
    globals: HashMap<String, Value>,
    scopes: Vec<HashMap<String, Value>>,
    /// Index of the first scope belonging to the current template frame.
    frame: usize,
}

impl VariableStack {
    pub fn new() -> Self {
        VariableStack::default()
    }

    pub fn push_scope(&mut self) {
        self.scopes.push(HashMap::new());
    }

    pub fn pop_scope(&mut self) {
        if self.scopes.pop().is_none() {
            log::error!("variable scope pop with no open scope");
        }
    }

    /// Current scope depth, used to verify balanced push/pop.
    pub fn depth(&self) -> usize {
        self.scopes.len()
    }

    /// Starts a new template frame at the current depth and returns the
    /// previous frame base for [`exit_frame`](Self::exit_frame). Scopes
    /// pushed after this call belong to the new frame; everything below it
    /// becomes invisible until the frame is exited.
    pub fn enter_frame(&mut self) -> usize {
        std::mem::replace(&mut self.frame, self.scopes.len())
    }

    pub fn exit_frame(&mut self, saved: usize) {
        self.frame = saved;
    }

    /// Binds a name in the innermost scope.
    pub fn declare(&mut self, name: String, value: Value) {
        match self.scopes.last_mut() {
            Some(scope) => {
                scope.insert(name, value);
            }
            None => {
                log::error!("variable '{}' declared outside any scope", name);
            }
        }
    }

    pub fn declare_global(&mut self, name: String, value: Value) {
        self.globals.insert(name, value);
    }

    /// The scopes belonging to the current frame.
    fn frame_scopes(&self) -> &[HashMap<String, Value>] {
        self.scopes.get(self.frame..).unwrap_or(&[])
    }

    /// Whether a scope of the current frame binds `name`. Globals and the
    /// caller's frames are excluded, so a template parameter takes its
    /// default unless this invocation's `with-param` list bound it.
    pub fn is_locally_bound(&self, name: &str) -> bool {
        self.frame_scopes().iter().any(|s| s.contains_key(name))
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.frame_scopes()
            .iter()
            .rev()
            .find_map(|s| s.get(name))
            .or_else(|| self.globals.get(name))
    }

    /// Evaluates every top-level declaration with the source root as the
    /// context node. Earlier declarations are visible to later ones.
    /// Parameters use their defaults; nothing supplies external values.
    pub fn eval_globals(&mut self, style: &CompiledStylesheet, doc: &Document) {
        for decl in &style.globals {
            let value = match &decl.select {
                Some(expr) => {
                    let ctx = EvalContext {
                        doc,
                        node: doc.root(),
                        position: 1,
                        size: 1,
                        variables: Some(&*self),
                    };
                    match evaluate(expr, &ctx) {
                        Ok(v) => v,
                        Err(e) => {
                            log::error!("global variable '{}': {}", decl.name, e);
                            Value::empty_string()
                        }
                    }
                }
                None => Value::empty_string(),
            };
            self.declare_global(decl.name.clone(), value);
        }
    }
}

impl VariableResolver for VariableStack {
    fn lookup(&self, name: &str) -> Option<Value> {
        self.get(name).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::GlobalDecl;
    use folio_xpath1::parse_expression;

    #[test]
    fn inner_scopes_shadow_outer() {
        let mut vars = VariableStack::new();
        vars.push_scope();
        vars.declare("x".into(), Value::String("outer".into()));
        vars.push_scope();
        vars.declare("x".into(), Value::String("inner".into()));

        assert!(matches!(vars.get("x"), Some(Value::String(s)) if s == "inner"));
        vars.pop_scope();
        assert!(matches!(vars.get("x"), Some(Value::String(s)) if s == "outer"));
        vars.pop_scope();
        assert!(vars.get("x").is_none());
        assert_eq!(vars.depth(), 0);
    }

    #[test]
    fn locals_shadow_globals_but_local_check_ignores_them() {
        let mut vars = VariableStack::new();
        vars.declare_global("x".into(), Value::Number(1.0));
        assert!(!vars.is_locally_bound("x"));

        vars.push_scope();
        vars.declare("x".into(), Value::Number(2.0));
        assert!(vars.is_locally_bound("x"));
        assert!(matches!(vars.get("x"), Some(Value::Number(n)) if *n == 2.0));

        vars.pop_scope();
        assert!(matches!(vars.get("x"), Some(Value::Number(n)) if *n == 1.0));
    }

    #[test]
    fn frames_hide_caller_scopes() {
        let mut vars = VariableStack::new();
        vars.push_scope();
        vars.declare("who".into(), Value::String("caller".into()));

        let saved = vars.enter_frame();
        assert!(!vars.is_locally_bound("who"));
        assert!(vars.get("who").is_none());

        vars.push_scope();
        vars.declare("who".into(), Value::String("callee".into()));
        assert!(vars.is_locally_bound("who"));
        assert!(matches!(vars.get("who"), Some(Value::String(s)) if s == "callee"));
        vars.pop_scope();

        vars.exit_frame(saved);
        assert!(matches!(vars.get("who"), Some(Value::String(s)) if s == "caller"));
        vars.pop_scope();
    }

    #[test]
    fn globals_stay_visible_across_frames() {
        let mut vars = VariableStack::new();
        vars.declare_global("g".into(), Value::Number(1.0));
        vars.push_scope();
        let saved = vars.enter_frame();
        assert!(matches!(vars.get("g"), Some(Value::Number(n)) if *n == 1.0));
        assert!(!vars.is_locally_bound("g"));
        vars.exit_frame(saved);
        vars.pop_scope();
    }

    #[test]
    fn globals_evaluate_in_declaration_order() {
        let doc = Document::parse("<r><n>5</n></r>").unwrap();
        let mut style = CompiledStylesheet::default();
        style.globals.push(GlobalDecl {
            name: "base".into(),
            select: Some(parse_expression("r/n").unwrap()),
            is_param: false,
        });
        style.globals.push(GlobalDecl {
            name: "doubled".into(),
            select: Some(parse_expression("$base * 2").unwrap()),
            is_param: true,
        });

        let mut vars = VariableStack::new();
        vars.eval_globals(&style, &doc);
        assert!(matches!(vars.get("doubled"), Some(Value::Number(n)) if *n == 10.0));
    }
}
