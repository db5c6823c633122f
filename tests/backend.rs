use backend::x86;

fn assemble(src: &str) -> String {
    let ast = frontend::ast::Ast::try_from(src).unwrap();
    let program = middle::ir::Program::try_from(&ast).unwrap();
    x86::Program::try_from(&program).unwrap().to_string()
}

#[test]
fn prologue_and_epilogue_frame_the_function() {
    let asm = assemble("int main() { return 7; }");
    assert!(asm.starts_with(".intel_syntax noprefix"));
    assert!(asm.contains(".globl main"));
    let main_body = asm.split("main:").nth(1).unwrap();
    assert!(main_body.trim_start().starts_with("push rbp"));
    assert!(main_body.contains("mov rbp, rsp"));
    assert!(main_body.contains("pop rbp"));
    assert!(main_body.contains("ret"));
}

#[test]
fn every_call_site_realigns_the_stack() {
    let asm = assemble(
        "int f(int x) { return x + 1; }
         int main() { return f(f(f(1))); }",
    );
    let lines: Vec<&str> = asm.lines().map(str::trim).collect();
    let call_sites: Vec<usize> = lines
        .iter()
        .enumerate()
        .filter(|(_, line)| line.starts_with("call "))
        .map(|(i, _)| i)
        .collect();
    assert!(!call_sites.is_empty());
    for i in call_sites {
        assert!(lines[..i]
            .iter()
            .rev()
            .take(4)
            .any(|line| *line == "and rsp, -16"));
        assert_eq!(lines[i + 1], "mov rsp, QWORD PTR [rsp + 8]");
    }
}

#[test]
fn scratch_registers_are_caller_saved() {
    // rbp is the only callee-saved register the emitter touches, and the
    // prologue saves it; rbx and r12-r15 must never appear
    let asm = assemble(
        "int f(int x) { return x * 2 + (x << 1) - x % 3; }
         int main() {
            int arr[2] = {1, 2};
            int *p = arr;
            p[0] = f(p[1]);
            printf(\"%d\\n\", arr[0]);
            return 0;
         }",
    );
    for reg in ["rbx", "r12", "r13", "r14", "r15"] {
        assert!(!asm.contains(reg), "emitted code clobbers {reg}");
    }
}

#[test]
fn printf_clears_the_vector_count_register() {
    let asm = assemble("int main() { printf(\"%d\\n\", 1); return 0; }");
    let lines: Vec<&str> = asm.lines().map(str::trim).collect();
    let call = lines
        .iter()
        .position(|line| *line == "call printf")
        .unwrap();
    assert!(lines[..call].iter().rev().take(6).any(|line| *line == "xor eax, eax"));
    assert!(lines[..call]
        .iter()
        .any(|line| line.starts_with("lea rdi, [rip + .LC")));
}

#[test]
fn string_literals_land_in_rodata() {
    let asm = assemble("int main() { printf(\"hi\\n\"); return 0; }");
    assert!(asm.contains(".section .rodata"));
    assert!(asm.contains(".LC0:"));
    assert!(asm.contains(".string \"hi\\n\""));
}

#[test]
fn globals_are_emitted_as_a_data_image() {
    let asm = assemble("int counter = 9; int main() { return counter; }");
    assert!(asm.contains(".data"));
    assert!(asm.contains("globals:"));
    assert!(asm.contains(".long 9"));
    assert!(asm.contains("[rip + globals]"));
}

#[test]
fn int_loads_sign_extend() {
    let asm = assemble("int main() { int x = -3; return x; }");
    assert!(asm.contains("movsxd"));
}

#[test]
fn seven_argument_call_is_rejected() {
    let ast = frontend::ast::Ast::try_from(
        "int f(int a, int b, int c, int d, int e, int g, int h) { return a; }
         int main() { return f(1, 2, 3, 4, 5, 6, 7); }",
    )
    .unwrap();
    let program = middle::ir::Program::try_from(&ast).unwrap();
    let err = x86::Program::try_from(&program).unwrap_err();
    assert!(err.to_string().contains("more than 6 arguments"));
}

#[test]
fn oversized_printf_is_rejected() {
    let ast = frontend::ast::Ast::try_from(
        "int main() { printf(\"%d%d%d%d%d%d\\n\", 1, 2, 3, 4, 5, 6); return 0; }",
    )
    .unwrap();
    let program = middle::ir::Program::try_from(&ast).unwrap();
    let err = x86::Program::try_from(&program).unwrap_err();
    assert!(err.to_string().contains("more than 5 values"));
}
