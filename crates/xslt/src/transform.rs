//! The transformation core: the context threaded through every
//! instruction, template dispatch with the built-in default rules, the body
//! interpreter, and the entry point.

use crate::ast::{
    Avt, AvtPart, BodyNode, CompiledStylesheet, Instruction, LiteralElement, OutputMethod,
    SortKey, SpacePolicy, When, WithParam,
};
use crate::error::XsltError;
use crate::output;
use crate::pattern;
use crate::variables::VariableStack;
use folio_dom::{Doctype, Document, NodeId, NodeKind, QName};
use folio_xpath1::{EvalContext, Expression, Value, evaluate};

/// Applies a compiled stylesheet to a source document and returns the
/// result document.
///
/// The source is mutated: ignorable blank text nodes are stripped as they
/// are encountered. Stripping converges, so re-running the same transform
/// on the stripped source produces the same result. Callers who need the
/// source untouched must work on a copy.
pub fn apply_stylesheet(
    style: &CompiledStylesheet,
    source: &mut Document,
) -> Result<Document, XsltError> {
    TransformContext::new(style, source)?.run()
}

/// The mutable state of one transformation. Every instruction handler
/// snapshots the fields it changes and restores them on all exit paths.
pub struct TransformContext<'s> {
    pub(crate) style: &'s CompiledStylesheet,
    pub(crate) source: &'s mut Document,
    pub(crate) result: Document,
    /// Context node for XPath evaluation.
    pub(crate) node: NodeId,
    /// The node list being iterated by `apply-templates` / `for-each`.
    pub(crate) node_list: Option<Vec<NodeId>>,
    /// 1-based proximity position within `node_list`.
    pub(crate) position: usize,
    /// Length of `node_list`.
    pub(crate) size: usize,
    /// Result-tree node new output is appended under.
    pub(crate) insert: NodeId,
    /// Current template mode.
    pub(crate) mode: Option<String>,
    pub(crate) vars: VariableStack,
    pub(crate) output: OutputMethod,
    /// Side documents a `document()` call would own; nothing loads any yet.
    #[allow(dead_code)]
    pub(crate) extra_docs: Vec<Document>,
}

/// True when the text is nothing but XML whitespace (an "ignorable blank").
pub(crate) fn is_blank(text: &str) -> bool {
    text.chars().all(|c| matches!(c, ' ' | '\t' | '\r' | '\n'))
}

impl<'s> TransformContext<'s> {
    pub(crate) fn new(
        style: &'s CompiledStylesheet,
        source: &'s mut Document,
    ) -> Result<Self, XsltError> {
        let mut vars = VariableStack::new();
        vars.eval_globals(style, source);

        let output = OutputMethod::resolve(&style.output)?;
        let mut result = Document::new();
        match output {
            OutputMethod::Html => {
                result.html = true;
                if style.output.doctype_public.is_some() || style.output.doctype_system.is_some() {
                    result.doctype = Some(Doctype {
                        name: "html".to_string(),
                        public_id: style.output.doctype_public.clone(),
                        system_id: style.output.doctype_system.clone(),
                    });
                }
            }
            OutputMethod::Xml | OutputMethod::Text => {
                result.version = style.output.version.clone().or_else(|| Some("1.0".to_string()));
            }
        }
        result.encoding = style.output.encoding.clone().or_else(|| Some("UTF-8".to_string()));

        let insert = result.root();
        let node = source.root();
        Ok(TransformContext {
            style,
            source,
            result,
            node,
            node_list: None,
            position: 1,
            size: 1,
            insert,
            mode: None,
            vars,
            output,
            extra_docs: Vec::new(),
        })
    }

    /// Drives the transformation from the source document root and returns
    /// the finished result document.
    pub(crate) fn run(mut self) -> Result<Document, XsltError> {
        let root = self.source.root();
        self.node = root;
        self.insert = self.result.root();
        self.process_one_node(root);
        self.attach_doctype();
        Ok(self.result)
    }

    fn attach_doctype(&mut self) {
        if self.output != OutputMethod::Xml {
            return;
        }
        let spec = &self.style.output;
        if spec.doctype_public.is_none() && spec.doctype_system.is_none() {
            return;
        }
        if let Some(root_el) = self.result.root_element() {
            let name = self
                .result
                .name(root_el)
                .map(|q| q.to_string())
                .unwrap_or_default();
            self.result.doctype = Some(Doctype {
                name,
                public_id: spec.doctype_public.clone(),
                system_id: spec.doctype_system.clone(),
            });
        }
    }

    pub(crate) fn src_doc(&self) -> &Document {
        &*self.source
    }

    pub(crate) fn eval_ctx(&self) -> EvalContext<'_> {
        EvalContext {
            doc: &*self.source,
            node: self.node,
            position: self.position,
            size: self.size,
            variables: Some(&self.vars),
        }
    }

    // --- Template dispatch ---

    /// Finds the best-matching rule for `node` in the current mode, falling
    /// back to the built-in default rules.
    pub(crate) fn process_one_node(&mut self, node: NodeId) {
        let style = self.style;
        let found = pattern::find_template(style, self.src_doc(), node, self.mode.as_deref());
        match found {
            Some(rule) => {
                // The matched template runs in its own variable frame.
                let frame = self.vars.enter_frame();
                self.apply_one_template(&rule.body);
                self.vars.exit_frame(frame);
            }
            None => self.default_process_node(node),
        }
    }

    /// The built-in rules: recurse through documents and elements, copy
    /// character data, drop everything else.
    fn default_process_node(&mut self, node: NodeId) {
        match self.source.kind(node) {
            NodeKind::Document { .. } | NodeKind::Element { .. } => {}
            NodeKind::Text(text) | NodeKind::CData(text) => {
                output::append_text(&mut self.result, self.insert, text);
                return;
            }
            _ => return,
        }

        let parent_name = self.source.name(node).map(|q| q.local.clone());
        let children = self.source.children(node).to_vec();
        let saved_node = self.node;
        for child in children {
            // Decide first, then mutate: stripping must never disturb the
            // walk over the remaining siblings.
            let mut recurse = None;
            let mut strip = false;
            match self.source.kind(child) {
                NodeKind::Document { .. } | NodeKind::Element { .. } => recurse = Some(child),
                NodeKind::Text(text) => {
                    if is_blank(text) && self.should_strip(parent_name.as_deref()) {
                        strip = true;
                    } else {
                        output::append_text(&mut self.result, self.insert, text);
                    }
                }
                NodeKind::CData(text) => {
                    output::append_text(&mut self.result, self.insert, text);
                }
                _ => {}
            }
            if strip {
                self.source.detach(child);
            }
            if let Some(next) = recurse {
                self.node = next;
                self.process_one_node(next);
            }
        }
        self.node = saved_node;
    }

    /// Whether an ignorable blank text node under an element named
    /// `parent_local` is stripped: an explicit entry decides, otherwise the
    /// `*` entry, otherwise keep.
    fn should_strip(&self, parent_local: Option<&str>) -> bool {
        let map = &self.style.strip_space;
        if map.is_empty() {
            return false;
        }
        if let Some(name) = parent_local {
            match map.get(name) {
                Some(SpacePolicy::Strip) => return true,
                Some(SpacePolicy::Preserve) => return false,
                None => {}
            }
        }
        matches!(map.get("*"), Some(SpacePolicy::Strip))
    }

    // --- Body interpretation ---

    /// Walks a compiled template body in document order. The first
    /// `variable`/`param` in the body opens a scope that is popped when the
    /// body completes.
    pub(crate) fn apply_one_template(&mut self, body: &[BodyNode]) {
        let mut opened_scope = false;
        for item in body {
            match item {
                BodyNode::Text(text) => {
                    output::append_text(&mut self.result, self.insert, text);
                }
                BodyNode::Comment(content) => {
                    output::append_comment(&mut self.result, self.insert, content);
                }
                BodyNode::Pi { target, data } => {
                    output::append_pi(&mut self.result, self.insert, target, data);
                }
                BodyNode::Element(element) => self.literal_element(element),
                BodyNode::Instruction(instruction) => {
                    let saved_insert = self.insert;
                    self.execute_instruction(instruction, &mut opened_scope);
                    self.insert = saved_insert;
                }
            }
        }
        if opened_scope {
            self.vars.pop_scope();
        }
    }

    /// Copies a literal result element, evaluates its attribute value
    /// templates, and descends into its children with the copy as the
    /// insertion point.
    fn literal_element(&mut self, element: &LiteralElement) {
        let copy = output::copy_literal_element(&mut self.result, self.insert, element);
        for attr in &element.attributes {
            let value = self.eval_avt(&attr.value);
            self.result.set_attribute(copy, attr.name.clone(), attr.ns_uri.clone(), &value);
        }
        let saved_insert = self.insert;
        self.insert = copy;
        self.apply_one_template(&element.children);
        self.insert = saved_insert;
    }

    fn execute_instruction(&mut self, instruction: &Instruction, opened_scope: &mut bool) {
        match instruction {
            Instruction::ApplyTemplates { select, mode, sorts } => {
                self.apply_templates(select.as_ref(), mode.as_deref(), sorts);
            }
            Instruction::ForEach { select, sorts, body } => self.for_each(select, sorts, body),
            Instruction::If { test, body } => {
                let outcome = evaluate(test, &self.eval_ctx());
                match outcome {
                    Ok(value) => {
                        if value.to_bool() {
                            self.apply_one_template(body);
                        }
                    }
                    Err(e) => log::error!("xsl:if: {}", e),
                }
            }
            Instruction::Choose { whens, otherwise } => {
                self.choose(whens, otherwise.as_deref());
            }
            Instruction::ValueOf { select, disable_escaping } => {
                if *disable_escaping {
                    log::warn!(
                        "xsl:value-of: disable-output-escaping is not implemented, text stays escaped"
                    );
                }
                let outcome = evaluate(select, &self.eval_ctx());
                match outcome {
                    Ok(value) => {
                        let text = value.string_value(self.src_doc());
                        output::append_text(&mut self.result, self.insert, &text);
                    }
                    Err(e) => log::error!("xsl:value-of: {}", e),
                }
            }
            Instruction::CallTemplate { local, ns_uri, params } => {
                self.call_template(local, ns_uri.as_deref(), params);
            }
            Instruction::Attribute { name, has_namespace_attr, body } => {
                self.attribute(name, *has_namespace_attr, body);
            }
            Instruction::Comment { body } => {
                let content = self.eval_body_to_string(body);
                // TODO: reject "--" runs and a trailing "-" in the content
                output::append_comment(&mut self.result, self.insert, &content);
            }
            Instruction::ProcessingInstruction { name, body } => {
                let target = self.eval_avt(name);
                if target.is_empty() {
                    log::error!("xsl:processing-instruction: name is empty");
                    return;
                }
                // TODO: validate the target as an NCName and reject "?>" in the data
                let data = self.eval_body_to_string(body);
                output::append_pi(&mut self.result, self.insert, &target, &data);
            }
            Instruction::Variable { name, select } => {
                if !*opened_scope {
                    self.vars.push_scope();
                    *opened_scope = true;
                }
                let value = self.eval_binding(name, select.as_ref());
                self.vars.declare(name.clone(), value);
            }
            Instruction::Param { name, select } => {
                // A caller's with-param binding suppresses the default.
                if self.vars.is_locally_bound(name) {
                    return;
                }
                if !*opened_scope {
                    self.vars.push_scope();
                    *opened_scope = true;
                }
                let value = self.eval_binding(name, select.as_ref());
                self.vars.declare(name.clone(), value);
            }
            Instruction::Text(text) => {
                output::append_text(&mut self.result, self.insert, text);
            }
            Instruction::Message { body } => {
                let message = self.eval_body_to_string(body);
                log::warn!("xsl:message: {}", message);
            }
        }
    }

    // --- Instruction handlers ---

    fn apply_templates(
        &mut self,
        select: Option<&Expression>,
        mode: Option<&str>,
        sorts: &[SortKey],
    ) {
        let mut list = match select {
            Some(expr) => match evaluate(expr, &self.eval_ctx()) {
                Ok(Value::NodeSet(nodes)) => nodes,
                Ok(_) => {
                    log::error!("xsl:apply-templates: select did not evaluate to a node set");
                    return;
                }
                Err(e) => {
                    log::error!("xsl:apply-templates: {}", e);
                    return;
                }
            },
            None => self.child_list_with_strip(self.node),
        };

        let saved_node = self.node;
        let saved_list = self.node_list.take();
        let saved_size = self.size;
        let saved_position = self.position;
        let saved_mode = self.mode.take();

        self.mode = mode.map(str::to_string);
        self.size = list.len();
        self.sort_node_list(&mut list, sorts);
        self.node_list = Some(list.clone());

        for (i, &node) in list.iter().enumerate() {
            self.node = node;
            self.position = i + 1;
            self.process_one_node(node);
        }

        self.node = saved_node;
        self.node_list = saved_list;
        self.size = saved_size;
        self.position = saved_position;
        self.mode = saved_mode;
    }

    /// The implicit node list of `apply-templates` without `select`:
    /// elements, documents, and character data survive, ignorable blanks
    /// are stripped per the stylesheet map, everything else is dropped.
    fn child_list_with_strip(&mut self, node: NodeId) -> Vec<NodeId> {
        let parent_name = self.source.name(node).map(|q| q.local.clone());
        let children = self.source.children(node).to_vec();
        let mut list = Vec::with_capacity(children.len());
        for child in children {
            let mut strip = false;
            match self.source.kind(child) {
                NodeKind::Element { .. } | NodeKind::Document { .. } | NodeKind::CData(_) => {
                    list.push(child);
                }
                NodeKind::Text(text) => {
                    if is_blank(text) && self.should_strip(parent_name.as_deref()) {
                        strip = true;
                    } else {
                        list.push(child);
                    }
                }
                _ => {}
            }
            if strip {
                self.source.detach(child);
            }
        }
        list
    }

    fn for_each(&mut self, select: &Expression, sorts: &[SortKey], body: &[BodyNode]) {
        let mut list = match evaluate(select, &self.eval_ctx()) {
            Ok(Value::NodeSet(nodes)) => nodes,
            Ok(_) => {
                log::error!("xsl:for-each: select did not evaluate to a node set");
                return;
            }
            Err(e) => {
                log::error!("xsl:for-each: {}", e);
                return;
            }
        };

        let saved_node = self.node;
        let saved_list = self.node_list.take();
        let saved_size = self.size;
        let saved_position = self.position;

        self.size = list.len();
        self.sort_node_list(&mut list, sorts);
        self.node_list = Some(list.clone());

        for (i, &node) in list.iter().enumerate() {
            self.node = node;
            self.position = i + 1;
            self.apply_one_template(body);
        }

        self.node = saved_node;
        self.node_list = saved_list;
        self.size = saved_size;
        self.position = saved_position;
    }

    fn choose(&mut self, whens: &[When], otherwise: Option<&[BodyNode]>) {
        for when in whens {
            let outcome = evaluate(&when.test, &self.eval_ctx());
            match outcome {
                Ok(value) => {
                    if value.to_bool() {
                        self.apply_one_template(&when.body);
                        return;
                    }
                }
                // A failing test reads as false; later branches still run.
                Err(e) => log::error!("xsl:when: {}", e),
            }
        }
        if let Some(body) = otherwise {
            self.apply_one_template(body);
        }
    }

    fn call_template(&mut self, local: &str, ns_uri: Option<&str>, params: &[WithParam]) {
        let style = self.style;
        let Some(template) = style.named_template(local, ns_uri) else {
            log::error!("xsl:call-template: template '{}' not found", local);
            return;
        };

        // Evaluate the arguments in the caller's frame before opening the
        // callee's.
        let mut bound = Vec::with_capacity(params.len());
        for param in params {
            let value = match evaluate(&param.select, &self.eval_ctx()) {
                Ok(v) => v,
                Err(e) => {
                    log::error!("xsl:with-param '{}': {}", param.name, e);
                    Value::empty_string()
                }
            };
            bound.push((param.name.clone(), value));
        }

        // The parameter scope sits at the base of the callee's frame, so the
        // callee's xsl:param sees these bindings but nothing else local to
        // the caller.
        let frame = self.vars.enter_frame();
        let opened = !bound.is_empty();
        if opened {
            self.vars.push_scope();
            for (name, value) in bound {
                self.vars.declare(name, value);
            }
        }
        self.apply_one_template(&template.body);
        if opened {
            self.vars.pop_scope();
        }
        self.vars.exit_frame(frame);
    }

    fn attribute(&mut self, name: &Avt, has_namespace_attr: bool, body: &[BodyNode]) {
        if has_namespace_attr {
            log::warn!("xsl:attribute: the namespace attribute is not implemented, instruction skipped");
            return;
        }
        if !self.result.is_element(self.insert) {
            log::error!("xsl:attribute: insertion point is not an element");
            return;
        }
        if !self.result.children(self.insert).is_empty() {
            log::error!("xsl:attribute: element already has children");
            return;
        }
        let name = self.eval_avt(name);
        if name.is_empty() {
            log::error!("xsl:attribute: name is empty");
            return;
        }
        let qname = QName::parse(&name);
        if qname.prefix.is_none() && qname.local == "xmlns" {
            log::error!("xsl:attribute: the name xmlns is forbidden");
            return;
        }
        let ns_uri = match &qname.prefix {
            Some(prefix) => {
                let uri = self
                    .result
                    .lookup_ns_uri(self.insert, Some(prefix))
                    .map(str::to_string);
                if uri.is_none() {
                    log::warn!("xsl:attribute: no namespace bound to prefix {}", prefix);
                }
                uri
            }
            None => None,
        };
        let value = self.eval_body_to_string(body);
        self.result.set_attribute(self.insert, qname, ns_uri, &value);
    }

    // --- Evaluation helpers ---

    /// Runs a body with a detached holder element as the insertion point
    /// and returns the string value of what it produced.
    fn eval_body_to_string(&mut self, body: &[BodyNode]) -> String {
        let holder = self.result.create_element(QName::local("text-holder"));
        let saved_insert = self.insert;
        self.insert = holder;
        self.apply_one_template(body);
        self.insert = saved_insert;
        self.result.string_value(holder)
    }

    fn eval_binding(&self, name: &str, select: Option<&Expression>) -> Value {
        match select {
            Some(expr) => match evaluate(expr, &self.eval_ctx()) {
                Ok(value) => value,
                Err(e) => {
                    log::error!("binding '{}': {}", name, e);
                    Value::empty_string()
                }
            },
            None => Value::empty_string(),
        }
    }

    /// Concatenates the literal runs and evaluated `{expr}` fragments of an
    /// attribute value template.
    pub(crate) fn eval_avt(&self, avt: &Avt) -> String {
        let mut out = String::new();
        for part in &avt.parts {
            match part {
                AvtPart::Literal(text) => out.push_str(text),
                AvtPart::Expr(expr) => match evaluate(expr, &self.eval_ctx()) {
                    Ok(value) => out.push_str(&value.string_value(self.src_doc())),
                    Err(e) => log::error!("attribute value template: {}", e),
                },
            }
        }
        out
    }
}
