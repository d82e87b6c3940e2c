//! Lexer and parser turning MDX source text into the CST defined by
//! `mdx-ast` (spec.md §4.A/§4.B).

pub mod lexer;
pub mod parser;

pub use parser::{parse, ParserOptions};

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parses_measure_only_query() {
        let q = parse(
            "SELECT {[Measures].[Sales Amount]} ON 0 FROM [Adventure Works]",
            &ParserOptions::default(),
        )
        .unwrap();
        assert!(q.with.is_none());
        assert_eq!(q.select.axes.len(), 1);
        assert_eq!(q.select.cube.name(), "Adventure Works");
    }

    #[test]
    fn parses_with_clause_and_slicer() {
        let mdx = r#"
            WITH MEMBER [Measures].[Profit] AS [Measures].[Sales Amount] - [Measures].[Total Cost]
            SELECT {[Measures].[Profit]} ON 0,
                   {[Product].[Category].Members} ON 1
            FROM [Adventure Works]
            WHERE ([Date].[Calendar Year].&[2023])
        "#;
        let q = parse(mdx, &ParserOptions::default()).unwrap();
        assert!(q.with.is_some());
        assert_eq!(q.select.axes.len(), 2);
        assert!(q.select.where_clause.is_some());
    }

    #[test]
    fn rejects_empty_input() {
        assert!(parse("", &ParserOptions::default()).is_err());
    }

    #[test]
    fn rejects_input_over_size_limit() {
        let opts = ParserOptions {
            max_input_size_chars: Some(4),
            ..ParserOptions::default()
        };
        assert!(parse("SELECT {[Measures].[X]} ON 0 FROM [C]", &opts).is_err());
    }

    #[test]
    fn stops_at_first_syntax_error() {
        let err = parse("SELECT FROM [Cube]", &ParserOptions::default()).unwrap_err();
        assert!(format!("{err}").len() > 0);
    }

    #[test]
    fn parses_specific_members_set() {
        let q = parse(
            "SELECT {[Measures].[Sales Amount]} ON 0, \
             {[Product].[Category].[Bikes], [Product].[Category].[Accessories]} ON 1 \
             FROM [Adventure Works]",
            &ParserOptions::default(),
        )
        .unwrap();
        assert_eq!(q.select.axes.len(), 2);
    }

    #[test]
    fn attaches_a_leading_comment_to_its_calc_member_def() {
        let mdx = "WITH\n-- quick margin estimate\nMEMBER [Measures].[Margin] AS \
                   [Measures].[Sales Amount] - [Measures].[Total Cost]\n\
                   SELECT {[Measures].[Margin]} ON 0 FROM [Cube]";
        let q = parse(mdx, &ParserOptions::default()).unwrap();
        let def = &q.with.unwrap().defs[0];
        assert_eq!(def.leading_comment.as_deref(), Some("-- quick margin estimate"));
    }

    #[test]
    fn a_comment_before_with_is_not_attached_to_the_first_member() {
        let mdx = "-- top of file\nWITH MEMBER [Measures].[X] AS 1 \
                   SELECT {[Measures].[X]} ON 0 FROM [Cube]";
        let q = parse(mdx, &ParserOptions::default()).unwrap();
        let def = &q.with.unwrap().defs[0];
        assert!(def.leading_comment.is_none());
    }

    #[test]
    fn only_the_nearest_of_several_comments_is_kept() {
        let mdx = "WITH\n-- stale note\n-- current note\nMEMBER [Measures].[X] AS 1 \
                   SELECT {[Measures].[X]} ON 0 FROM [Cube]";
        let q = parse(mdx, &ParserOptions::default()).unwrap();
        let def = &q.with.unwrap().defs[0];
        assert_eq!(def.leading_comment.as_deref(), Some("-- current note"));
    }
}
