use crate::common::*;
use crate::compiler::inputsource::InputSource;
use crate::compiler::lexer::{Lexer, Token};

fn tokens_of(source: &str) -> Vec<Token> {
    let source = InputSource::from_string(source);
    let mut lex = Lexer::new(&source);
    let mut tokens = Vec::new();
    loop {
        let token = lex.lex();
        if token == Token::End {
            break;
        }
        tokens.push(token);
    }
    tokens
}

#[test]
fn operators_use_longest_match() {
    assert_eq!(
        tokens_of(">>>= >>> >>= >> >= >"),
        vec![Token::AssignShru, Token::Shru, Token::AssignShr, Token::Shr, Token::Ge, Token::Gt]
    );
    assert_eq!(
        tokens_of("<<= << <= < == = ++ +="),
        vec![
            Token::AssignShl, Token::Shl, Token::Le, Token::Lt,
            Token::Eq, Token::Assign, Token::Increment, Token::AssignAdd,
        ]
    );
}

#[test]
fn comments_are_whitespace() {
    assert_eq!(
        tokens_of("1 // line\n + /* block\n spanning */ 2"),
        vec![Token::Number(1), Token::Plus, Token::Number(2)]
    );
}

#[test]
fn tag_labels_obey_the_allow_tags_latch() {
    let source = InputSource::from_string("fixed:x fixed:x");
    let mut lex = Lexer::new(&source);
    assert_eq!(lex.lex(), Token::Label("fixed".to_string()));
    assert_eq!(lex.lex(), Token::Symbol("x".to_string()));
    lex.allow_tags = false;
    assert_eq!(lex.lex(), Token::Symbol("fixed".to_string()));
    assert_eq!(lex.lex(), Token::Colon);
}

#[test]
fn symbolic_labels_and_the_skip_token() {
    assert_eq!(
        tokens_of(".name = _"),
        vec![Token::SymLabel("name".to_string()), Token::Assign, Token::Underscore]
    );
    // an underscore prefix makes an ordinary identifier
    assert_eq!(tokens_of("_x"), vec![Token::Symbol("_x".to_string())]);
}

#[test]
fn numeric_literals() {
    assert_eq!(tokens_of("0x1F"), vec![Token::Number(31)]);
    assert_eq!(tokens_of("'A'"), vec![Token::Number(65)]);
    assert_eq!(tokens_of("2.5"), vec![Token::Rational(2.5f64.to_bits() as Cell)]);
}

#[test]
fn unpacked_strings_use_one_cell_per_character() {
    let tokens = tokens_of("\"ab\"");
    assert_eq!(
        tokens,
        vec![Token::StringLit { cells: vec![97, 98, 0], packed: false }]
    );
}

#[test]
fn packed_strings_fill_cells_most_significant_first() {
    let tokens = tokens_of("!\"ab\"");
    match &tokens[0] {
        Token::StringLit { cells, packed: true } => {
            assert_eq!(cells.len(), 1);
            let top = (CELL_SIZE * 8 - CHAR_BITS) as u32;
            assert_eq!((cells[0] as UCell) >> top, 97); // 'a' in the top byte
        }
        other => panic!("unexpected token {:?}", other),
    }
}

#[test]
fn push_back_returns_the_same_token() {
    let source = InputSource::from_string("alpha beta");
    let mut lex = Lexer::new(&source);
    let first = lex.lex();
    lex.lex_push();
    assert_eq!(lex.lex(), first);
    assert_eq!(lex.lex(), Token::Symbol("beta".to_string()));
}
