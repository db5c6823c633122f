use {
    rstest::rstest,
    rstest_reuse::{apply, template},
    std::path::PathBuf,
};

#[template]
#[rstest]
fn fixtures(#[files("fixtures/*.c")] path: PathBuf) {}

#[apply(fixtures)]
fn execute_ir(path: PathBuf) {
    let fixture = Fixture::from(path);
    let mut output = Vec::new();
    let status = fixture.program.execute(&mut output).unwrap();
    assert_eq!(String::from_utf8(output).unwrap(), fixture.expected_stdout);
    assert_eq!(status, 0);
}

#[apply(fixtures)]
fn emit_asm(path: PathBuf) {
    let fixture = Fixture::from(path);
    let asm = backend::x86::Program::try_from(&fixture.program)
        .unwrap()
        .to_string();
    assert!(asm.starts_with(".intel_syntax noprefix"));
    assert!(asm.contains("main:"));
}

struct Fixture {
    program: middle::ir::Program,
    expected_stdout: String,
}

impl From<PathBuf> for Fixture {
    fn from(mut path: PathBuf) -> Self {
        let code = std::fs::read_to_string(&path).unwrap();
        let ast = frontend::ast::Ast::try_from(&*code).unwrap();
        let program = middle::ir::Program::try_from(&ast).unwrap();

        path.set_extension("stdout");
        let expected_stdout = std::fs::read_to_string(&path).unwrap_or_else(|e| {
            panic!("failed to read expected output file at path {path:?}: {e}")
        });

        Fixture {
            program,
            expected_stdout,
        }
    }
}
