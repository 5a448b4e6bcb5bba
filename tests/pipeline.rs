use blockhex::{
    codegen::Chunk,
    compile,
    error::CompileError,
    ihex::{self, HexOptions, Record, RecordType},
    parse::ParserError,
    semantic::SemanticError,
};

const PROGRAM: &str = "\
// Programa de ejemplo
loc x at 0x0010;
start at 0x0200;

block 0x0200 {
    x = 0x05;
    goto 0x0200;
}
";

fn lines(text: &str) -> Vec<String> {
    compile("test.blk", text, HexOptions::default())
        .expect("compilation failed")
        .lines
}

fn decode(lines: &[String]) -> Vec<Record> {
    lines
        .iter()
        .map(|line| line.parse().expect("invalid record"))
        .collect()
}

#[test]
fn example_program() {
    let lines = lines(PROGRAM);
    let records = decode(&lines);

    assert_eq!(records[0], Record::start_linear(0x0200));
    assert_eq!(
        ihex::chunks(&records),
        [Chunk {
            address: 0x0200,
            bytes: vec![0x02, 0x00, 0x10, 0x0E, 0x03, 0x05, 0x0B, 0x02, 0x00],
        }]
    );

    assert_eq!(lines.last().map(String::as_str), Some(":00000001FF"));
}

#[test]
fn records_round_trip() {
    let text = "\
loc a at 0x0100;
loc b at 0x0102;
block 0x1000 {
    a = a + 0x1 * b;
    mem[a + 0x4] = mem[0x0300];
    call DRAW_RECTANGLE(a, b, 0x10, 0x1FF);
    if (a == b) { goto 0x2000; } else { b = 0x0; }
}
block 0x2000 { a = 0x0; a = 0x1; a = 0x2; a = 0x3; a = 0x4; a = 0x5; }
";

    let output = compile("test.blk", text, HexOptions::default()).unwrap();
    let records = decode(&output.lines);

    assert_eq!(ihex::chunks(&records), output.image.chunks());
    for (record, line) in records.iter().zip(&output.lines) {
        assert!(record.bytes().len() <= ihex::RECORD_LIMIT);
        assert_eq!(&record.to_string(), line);
    }
}

#[test]
fn blocks_are_emitted_by_address() {
    let lines = lines("block 0x0300 { goto 0x0100; }\nblock 0x0100 { goto 0x0300; }");
    let addresses: Vec<_> = decode(&lines)
        .iter()
        .filter(|record| record.kind() == RecordType::Data)
        .map(Record::address)
        .collect();

    assert_eq!(addresses, [0x0100, 0x0300]);
}

#[test]
fn no_start_record_without_start() {
    let lines = lines("block 0x0 { }");
    assert_eq!(lines, [":0000000000", ":00000001FF"]);
}

#[test]
fn empty_block_round_trip() {
    let output = compile(
        "test.blk",
        "start at 0x0200; block 0x0200 { } block 0x0300 { goto 0x0; }",
        HexOptions::default(),
    )
    .unwrap();

    assert_eq!(
        output.lines,
        [":0400000500000200F5", ":0002000000FE", ":030300000B0000EF", ":00000001FF"]
    );

    let records = decode(&output.lines);
    assert_eq!(ihex::chunks(&records), output.image.chunks());
    assert_eq!(output.image.chunks()[0].address, 0x0200);
}

#[test]
fn flat_precedence() {
    let output = compile(
        "test.blk",
        "loc x at 0x1; block 0x0 { x = 0x1 + 0x2 * 0x3; }",
        HexOptions::default(),
    )
    .unwrap();

    // (0x1 + 0x2) * 0x3
    assert_eq!(
        output.image.chunks()[0].bytes,
        [0x02, 0x00, 0x01, 0x0E, 0x03, 0x01, 0x0F, 0x03, 0x02, 0x11, 0x03, 0x03]
    );
}

#[test]
fn memory_operand_asymmetry() {
    let options = HexOptions::default();

    assert!(compile("test.blk", "block 0x0 { mem[0x1 + 0x1] = mem[0x0010]; }", options).is_ok());

    let error = compile("test.blk", "loc x at 0x1; block 0x0 { x = mem[x + 0x1]; }", options)
        .err()
        .unwrap();

    assert!(matches!(error, CompileError::Parse(_)));
}

#[test]
fn unknown_function() {
    let error = compile("test.blk", "block 0x0 { call UNKNOWN_FN(0x1); }", HexOptions::default())
        .err()
        .unwrap();

    match error {
        CompileError::Symbol(error) => {
            assert!(matches!(error.as_ref(), SemanticError::UnknownFunction(_)))
        }

        _ => panic!("expected a symbol error"),
    }
}

#[test]
fn duplicate_block() {
    let error = compile("test.blk", "block 0x0200 { }\nblock 0x0200 { }", HexOptions::default())
        .err()
        .unwrap();

    assert!(matches!(error, CompileError::Symbol(_)));
    assert_eq!(error.location().map(|location| location.start().line()), Some(2));
}

#[test]
fn missing_semicolon() {
    let error = compile("test.blk", "loc x at 0x10\nblock 0x0 { }", HexOptions::default())
        .err()
        .unwrap();

    match &error {
        CompileError::Parse(located) => {
            assert!(matches!(located.as_ref(), ParserError::UnexpectedToken(..)))
        }

        _ => panic!("expected a syntax error"),
    }

    assert!(error.to_string().contains("SEMICOLON"));
}

#[test]
fn illegal_character() {
    let error = compile("test.blk", "loc x at 0x10;\n@", HexOptions::default())
        .err()
        .unwrap();

    assert!(matches!(error, CompileError::Lex(_)));
    assert_eq!(error.kind(), "Lexical error");
}

#[test]
fn options_reach_the_encoder() {
    let output = compile("test.blk", PROGRAM, HexOptions::SEGMENT_START).unwrap();
    assert_eq!(output.lines[0], Record::start_segment(0x0200).to_string());

    let output = compile("test.blk", PROGRAM, HexOptions::NO_START).unwrap();
    assert!(decode(&output.lines)
        .iter()
        .all(|record| record.kind() != RecordType::StartLinearAddress));
}
