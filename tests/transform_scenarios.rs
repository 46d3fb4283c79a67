//! End-to-end transformation scenarios driven through string in, string out.

use folio::{Document, Processor};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn transform(stylesheet: &str, source: &str) -> String {
    init_logging();
    let processor = Processor::from_stylesheet_str(stylesheet).expect("stylesheet compiles");
    processor.transform_str(source).expect("transformation succeeds")
}

const XSL_OPEN: &str =
    r#"<xsl:stylesheet version="1.0" xmlns:xsl="http://www.w3.org/1999/XSL/Transform">"#;

fn stylesheet(body: &str) -> String {
    format!("{}{}</xsl:stylesheet>", XSL_OPEN, body)
}

#[test]
fn identity_on_text_only_document() {
    let xsl = stylesheet(r#"<xsl:template match="/"><xsl:apply-templates/></xsl:template>"#);
    assert_eq!(transform(&xsl, "<r>hello</r>"), "hello");
}

#[test]
fn value_of_coerces_to_string() {
    let xsl = stylesheet(r#"<xsl:template match="/"><xsl:value-of select="r/a[1]"/></xsl:template>"#);
    assert_eq!(transform(&xsl, "<r><a>1</a><a>2</a></r>"), "1");
}

#[test]
fn for_each_with_descending_numeric_sort() {
    let xsl = stylesheet(
        r#"<xsl:template match="/"><xsl:for-each select="r/i"><xsl:sort select="." data-type="number" order="descending"/><xsl:value-of select="."/>,</xsl:for-each></xsl:template>"#,
    );
    assert_eq!(transform(&xsl, "<r><i>10</i><i>2</i><i>30</i></r>"), "30,10,2,");
}

#[test]
fn conditional_on_element_name() {
    let xsl = stylesheet(
        r#"<xsl:template match="r"><out><xsl:if test="name()='r'">YES</xsl:if></out></xsl:template>"#,
    );
    assert_eq!(transform(&xsl, "<r/>"), "<out>YES</out>");
}

#[test]
fn named_template_with_parameter() {
    let xsl = stylesheet(
        r#"<xsl:template name="greet"><xsl:param name="who"/>Hello <xsl:value-of select="$who"/></xsl:template>
           <xsl:template match="/"><xsl:call-template name="greet"><xsl:with-param name="who" select="'world'"/></xsl:call-template></xsl:template>"#,
    );
    assert_eq!(transform(&xsl, "<r/>"), "Hello world");
}

#[test]
fn literal_element_with_avt_attribute() {
    let xsl = stylesheet(r#"<xsl:template match="r"><a href="u-{name()}"/></xsl:template>"#);
    assert_eq!(transform(&xsl, "<r/>"), r#"<a href="u-r"/>"#);
}

#[test]
fn empty_stylesheet_runs_the_default_rules() {
    let xsl = stylesheet("");
    assert_eq!(
        transform(&xsl, "<a>one<b>two<c>three</c></b><!-- gone -->four</a>"),
        "onetwothreefour"
    );
}

#[test]
fn proximity_position_and_size_during_iteration() {
    let xsl = stylesheet(
        r#"<xsl:template match="/"><xsl:for-each select="r/i"><xsl:value-of select="position()"/>/<xsl:value-of select="last()"/>;</xsl:for-each></xsl:template>"#,
    );
    assert_eq!(transform(&xsl, "<r><i/><i/><i/></r>"), "1/3;2/3;3/3;");
}

#[test]
fn position_works_through_apply_templates_too() {
    let xsl = stylesheet(
        r#"<xsl:template match="/"><xsl:apply-templates select="r/i"/></xsl:template>
           <xsl:template match="i">[<xsl:value-of select="position()"/>]</xsl:template>"#,
    );
    assert_eq!(transform(&xsl, "<r><i/><i/></r>"), "[1][2]");
}

#[test]
fn stable_sort_preserves_order_of_equal_keys() {
    let xsl = stylesheet(
        r#"<xsl:template match="/"><xsl:for-each select="r/i"><xsl:sort select="@k"/><xsl:value-of select="."/>,</xsl:for-each></xsl:template>"#,
    );
    assert_eq!(
        transform(&xsl, r#"<r><i k="b">1</i><i k="a">2</i><i k="b">3</i><i k="a">4</i></r>"#),
        "2,4,1,3,"
    );
}

#[test]
fn multiple_sort_keys_make_the_first_primary() {
    let xsl = stylesheet(
        r#"<xsl:template match="/"><xsl:for-each select="r/item"><xsl:sort select="n"/><xsl:sort select="p" data-type="number" order="descending"/><xsl:value-of select="n"/>-<xsl:value-of select="p"/>;</xsl:for-each></xsl:template>"#,
    );
    let src = "<r><item><n>gadget</n><p>9</p></item><item><n>widget</n><p>15</p></item><item><n>gadget</n><p>12</p></item></r>";
    assert_eq!(transform(&xsl, src), "gadget-12;gadget-9;widget-15;");
}

#[test]
fn choose_takes_the_first_true_branch() {
    let xsl = stylesheet(
        r#"<xsl:template match="/"><xsl:for-each select="r/i"><xsl:choose><xsl:when test=". &lt; 3">low;</xsl:when><xsl:when test=". &lt; 30">mid;</xsl:when><xsl:otherwise>high;</xsl:otherwise></xsl:choose></xsl:for-each></xsl:template>"#,
    );
    assert_eq!(transform(&xsl, "<r><i>1</i><i>10</i><i>99</i></r>"), "low;mid;high;");
}

#[test]
fn templates_dispatch_by_priority_and_mode() {
    let xsl = stylesheet(
        r#"<xsl:template match="/"><xsl:apply-templates select="r/*"/>|<xsl:apply-templates select="r/*" mode="short"/></xsl:template>
           <xsl:template match="*">any;</xsl:template>
           <xsl:template match="b">bee;</xsl:template>
           <xsl:template match="*" mode="short">s;</xsl:template>"#,
    );
    assert_eq!(transform(&xsl, "<r><a/><b/></r>"), "any;bee;|s;s;");
}

#[test]
fn param_defaults_ignore_caller_variables() {
    // A caller-side variable with the same name as the callee's parameter
    // must not stand in for a missing with-param.
    let xsl = stylesheet(
        r#"<xsl:template name="greet"><xsl:param name="who" select="'default'"/>Hello <xsl:value-of select="$who"/></xsl:template>
           <xsl:template match="/"><xsl:variable name="who" select="'caller'"/><xsl:call-template name="greet"/>|<xsl:call-template name="greet"><xsl:with-param name="who" select="$who"/></xsl:call-template></xsl:template>"#,
    );
    assert_eq!(transform(&xsl, "<r/>"), "Hello default|Hello caller");
}

#[test]
fn caller_locals_do_not_leak_into_matched_templates() {
    let xsl = stylesheet(
        r#"<xsl:template match="/"><xsl:variable name="x" select="'hidden'"/><xsl:apply-templates select="r"/></xsl:template>
           <xsl:template match="r">[<xsl:value-of select="$x"/>]</xsl:template>"#,
    );
    assert_eq!(transform(&xsl, "<r/>"), "[]");
}

#[test]
fn variables_and_shadowing() {
    let xsl = stylesheet(
        r#"<xsl:variable name="x" select="'global'"/>
           <xsl:template match="/"><xsl:value-of select="$x"/>,<xsl:for-each select="r"><xsl:variable name="x" select="'local'"/><xsl:value-of select="$x"/></xsl:for-each>,<xsl:value-of select="$x"/></xsl:template>"#,
    );
    assert_eq!(transform(&xsl, "<r/>"), "global,local,global");
}

#[test]
fn xsl_text_preserves_whitespace_that_literal_text_loses() {
    let xsl = stylesheet(
        "<xsl:template match=\"/\">\n  <xsl:text> padded </xsl:text>\n</xsl:template>",
    );
    assert_eq!(transform(&xsl, "<r/>"), " padded ");
}

#[test]
fn comment_and_processing_instruction_output() {
    let xsl = stylesheet(
        r#"<xsl:template match="/"><out><xsl:comment>c=<xsl:value-of select="r"/></xsl:comment><xsl:processing-instruction name="app">run</xsl:processing-instruction></out></xsl:template>"#,
    );
    assert_eq!(transform(&xsl, "<r>1</r>"), "<out><!--c=1--><?app run?></out>");
}

#[test]
fn attribute_instruction_sets_attributes_before_content() {
    let xsl = stylesheet(
        r#"<xsl:template match="/"><a><xsl:attribute name="href"><xsl:value-of select="r/@to"/></xsl:attribute><xsl:value-of select="r"/></a></xsl:template>"#,
    );
    assert_eq!(
        transform(&xsl, r#"<r to="x.html">click</r>"#),
        r#"<a href="x.html">click</a>"#
    );
}

#[test]
fn attribute_after_children_is_dropped_with_children_intact() {
    let xsl = stylesheet(
        r#"<xsl:template match="/"><a>first<xsl:attribute name="late">no</xsl:attribute></a></xsl:template>"#,
    );
    assert_eq!(transform(&xsl, "<r/>"), "<a>first</a>");
}

#[test]
fn strip_space_declaration_drives_stripping() {
    let xsl = stylesheet(
        r#"<xsl:strip-space elements="r"/>
           <xsl:template match="/"><xsl:apply-templates/></xsl:template>"#,
    );
    assert_eq!(transform(&xsl, "<r>  <i>a</i>\n  <i>b</i>  </r>"), "ab");
}

#[test]
fn stripping_twice_converges() {
    init_logging();
    let xsl = stylesheet(
        r#"<xsl:strip-space elements="*"/>
           <xsl:template match="/"><xsl:apply-templates/></xsl:template>"#,
    );
    let processor = Processor::from_stylesheet_str(&xsl).unwrap();
    let mut source = Document::parse("<r> <i>a</i> <i>b</i> </r>").unwrap();
    let first = processor.transform_document(&mut source).unwrap();
    let second = processor.transform_document(&mut source).unwrap();
    assert_eq!(
        first.string_value(first.root()),
        second.string_value(second.root())
    );
    assert_eq!(first.string_value(first.root()), "ab");
}

#[test]
fn text_output_method_returns_raw_text() {
    let xsl = stylesheet(
        r#"<xsl:output method="text"/>
           <xsl:template match="/">a &amp; b: <xsl:value-of select="r"/></xsl:template>"#,
    );
    assert_eq!(transform(&xsl, "<r>&lt;ok&gt;</r>"), "a & b: <ok>");
}

#[test]
fn xml_output_attaches_the_declared_doctype() {
    let xsl = stylesheet(
        r#"<xsl:output doctype-system="out.dtd"/>
           <xsl:template match="/"><top/></xsl:template>"#,
    );
    assert_eq!(transform(&xsl, "<r/>"), r#"<!DOCTYPE top SYSTEM "out.dtd"><top/>"#);
}

#[test]
fn unsupported_output_method_fails_the_transformation() {
    init_logging();
    let xsl = stylesheet(r#"<xsl:output method="pdf"/>"#);
    let processor = Processor::from_stylesheet_str(&xsl).unwrap();
    assert!(processor.transform_str("<r/>").is_err());
}

#[test]
fn literal_namespaces_reach_the_result_once() {
    let xsl = r#"<xsl:stylesheet version="1.0" xmlns:xsl="http://www.w3.org/1999/XSL/Transform" xmlns:fo="urn:fo">
             <xsl:template match="/"><fo:root><fo:block>x</fo:block></fo:root></xsl:template>
           </xsl:stylesheet>"#;
    assert_eq!(
        transform(xsl, "<r/>"),
        r#"<fo:root xmlns:fo="urn:fo"><fo:block>x</fo:block></fo:root>"#
    );
}

#[test]
fn unknown_called_template_is_skipped_not_fatal() {
    let xsl = stylesheet(
        r#"<xsl:template match="/">before-<xsl:call-template name="missing"/>after</xsl:template>"#,
    );
    assert_eq!(transform(&xsl, "<r/>"), "before-after");
}

#[test]
fn nested_literal_elements_keep_the_insertion_point_straight() {
    let xsl = stylesheet(
        r#"<xsl:template match="/"><table><xsl:for-each select="r/row"><tr><td><xsl:value-of select="."/></td></tr></xsl:for-each></table></xsl:template>"#,
    );
    assert_eq!(
        transform(&xsl, "<r><row>1</row><row>2</row></r>"),
        "<table><tr><td>1</td></tr><tr><td>2</td></tr></table>"
    );
}

#[test]
fn global_params_use_their_defaults() {
    let xsl = stylesheet(
        r#"<xsl:param name="greeting" select="'hi'"/>
           <xsl:template match="/"><xsl:value-of select="$greeting"/></xsl:template>"#,
    );
    assert_eq!(transform(&xsl, "<r/>"), "hi");
}
