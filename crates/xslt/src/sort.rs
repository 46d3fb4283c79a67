//! The sort stage: reorders the active node list per `xsl:sort` keys.

use crate::ast::SortKey;
use crate::transform::TransformContext;
use folio_dom::NodeId;
use folio_xpath1::evaluate;
use std::cmp::Ordering;

/// One evaluated key slot. `None` marks a key whose coercion failed; it
/// orders below every real value.
#[derive(Debug, Clone, PartialEq)]
enum KeyValue {
    Text(String),
    Number(f64),
}

fn compare_slots(a: &Option<KeyValue>, b: &Option<KeyValue>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(KeyValue::Text(x)), Some(KeyValue::Text(y))) => x.cmp(y),
        (Some(KeyValue::Number(x)), Some(KeyValue::Number(y))) => {
            x.partial_cmp(y).unwrap_or(Ordering::Equal)
        }
        // Mixed slots cannot occur within one key; keep the order stable.
        _ => Ordering::Equal,
    }
}

impl<'s> TransformContext<'s> {
    /// Applies the instruction's sort keys to `list` in place. Keys run in
    /// reverse declaration order, each as a stable sort, so the first
    /// declared key ends up as the primary ordering.
    pub(crate) fn sort_node_list(&mut self, list: &mut Vec<NodeId>, keys: &[SortKey]) {
        if list.len() <= 1 {
            return;
        }
        for key in keys.iter().rev() {
            self.sort_by_key(list, key);
        }
    }

    fn sort_by_key(&mut self, list: &mut Vec<NodeId>, key: &SortKey) {
        let saved_node = self.node;
        let saved_position = self.position;

        // Evaluate the (already parsed) select once per list entry, with
        // that entry as the context node.
        let mut slots: Vec<Option<KeyValue>> = Vec::with_capacity(list.len());
        for (i, &node) in list.iter().enumerate() {
            self.node = node;
            self.position = i + 1;
            let slot = match evaluate(&key.select, &self.eval_ctx()) {
                Ok(value) => {
                    if key.numeric {
                        let n = value.to_number(self.src_doc());
                        if n.is_nan() {
                            log::debug!("xsl:sort: key did not evaluate to a number");
                            None
                        } else {
                            Some(KeyValue::Number(n))
                        }
                    } else {
                        Some(KeyValue::Text(value.string_value(self.src_doc())))
                    }
                }
                Err(e) => {
                    log::error!("xsl:sort: {}", e);
                    None
                }
            };
            slots.push(slot);
        }

        self.node = saved_node;
        self.position = saved_position;

        let mut order: Vec<usize> = (0..list.len()).collect();
        order.sort_by(|&a, &b| {
            let cmp = compare_slots(&slots[a], &slots[b]);
            if key.descending { cmp.reverse() } else { cmp }
        });
        *list = order.into_iter().map(|i| list[i]).collect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::CompiledStylesheet;
    use folio_dom::Document;
    use folio_xpath1::parse_expression;

    fn key(select: &str, numeric: bool, descending: bool) -> SortKey {
        SortKey { select: parse_expression(select).unwrap(), numeric, descending }
    }

    fn items(doc_src: &str) -> (CompiledStylesheet, Document, Vec<NodeId>) {
        let doc = Document::parse(doc_src).unwrap();
        let root = doc.root_element().unwrap();
        let list = doc.children(root).to_vec();
        (CompiledStylesheet::default(), doc, list)
    }

    fn sorted_values(
        style: &CompiledStylesheet,
        doc: &mut Document,
        mut list: Vec<NodeId>,
        keys: &[SortKey],
    ) -> Vec<String> {
        let mut ctx = TransformContext::new(style, doc).unwrap();
        ctx.size = list.len();
        ctx.sort_node_list(&mut list, keys);
        list.iter().map(|&n| ctx.src_doc().string_value(n)).collect()
    }

    #[test]
    fn text_ascending_is_default() {
        let (style, mut doc, list) = items("<r><i>pear</i><i>apple</i><i>plum</i></r>");
        let values = sorted_values(&style, &mut doc, list, &[key(".", false, false)]);
        assert_eq!(values, vec!["apple", "pear", "plum"]);
    }

    #[test]
    fn numeric_descending() {
        let (style, mut doc, list) = items("<r><i>10</i><i>2</i><i>30</i></r>");
        let values = sorted_values(&style, &mut doc, list, &[key(".", true, true)]);
        assert_eq!(values, vec!["30", "10", "2"]);
    }

    #[test]
    fn text_sort_is_lexicographic_numeric_is_not() {
        let (style, mut doc, list) = items("<r><i>10</i><i>2</i><i>30</i></r>");
        let text = sorted_values(&style, &mut doc, list.clone(), &[key(".", false, false)]);
        assert_eq!(text, vec!["10", "2", "30"]);
        let numeric = sorted_values(&style, &mut doc, list, &[key(".", true, false)]);
        assert_eq!(numeric, vec!["2", "10", "30"]);
    }

    #[test]
    fn unparseable_numbers_sort_first() {
        let (style, mut doc, list) = items("<r><i>5</i><i>n/a</i><i>1</i></r>");
        let values = sorted_values(&style, &mut doc, list, &[key(".", true, false)]);
        assert_eq!(values, vec!["n/a", "1", "5"]);
    }

    #[test]
    fn equal_keys_preserve_input_order() {
        let (style, mut doc, list) =
            items("<r><i k='b'>1</i><i k='a'>2</i><i k='b'>3</i><i k='a'>4</i></r>");
        let values = sorted_values(&style, &mut doc, list, &[key("@k", false, false)]);
        assert_eq!(values, vec!["2", "4", "1", "3"]);
    }

    #[test]
    fn first_key_is_primary() {
        let (style, mut doc, list) = items(
            "<r>\
             <i><n>gadget</n><p>9</p></i>\
             <i><n>widget</n><p>15</p></i>\
             <i><n>gadget</n><p>12</p></i>\
             </r>",
        );
        let keys = [key("n", false, false), key("p", true, true)];
        let values = sorted_values(&style, &mut doc, list, &keys);
        assert_eq!(values, vec!["gadget12", "gadget9", "widget15"]);
    }

    #[test]
    fn single_element_list_is_untouched() {
        let (style, mut doc, list) = items("<r><i>only</i></r>");
        let values = sorted_values(&style, &mut doc, list, &[key(".", true, true)]);
        assert_eq!(values, vec!["only"]);
    }
}
