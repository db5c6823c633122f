use {
    middle::{
        error::{CompileError, RuntimeError},
        ir,
        layout::FrameLayout,
        symbols::{ScopeStack, Storage},
        types::Type,
    },
    rstest::rstest,
};

fn compile(src: &str) -> Result<ir::Program, CompileError> {
    let ast = frontend::ast::Ast::try_from(src).unwrap();
    ir::Program::try_from(&ast)
}

fn run(src: &str) -> Result<(i32, String), RuntimeError> {
    let program = compile(src).unwrap();
    let mut output = Vec::new();
    let status = program.execute(&mut output)?;
    Ok((status, String::from_utf8(output).unwrap()))
}

#[rstest]
#[case(Type::Int, 4, 4)]
#[case(Type::Ptr(Box::new(Type::Int)), 8, 8)]
#[case(Type::Array(Box::new(Type::Int), 5), 20, 4)]
#[case(Type::Array(Box::new(Type::Ptr(Box::new(Type::Int))), 3), 24, 8)]
fn type_sizes(#[case] ty: Type, #[case] size: usize, #[case] align: usize) {
    assert_eq!(ty.size_of(), size);
    assert_eq!(ty.align_of(), align);
}

#[test]
fn pointer_scaling_factors() {
    assert_eq!(Type::Int.element_size(), None);
    assert_eq!(Type::Ptr(Box::new(Type::Int)).element_size(), Some(4));
    let int_ptr_ptr = Type::Ptr(Box::new(Type::Ptr(Box::new(Type::Int))));
    assert_eq!(int_ptr_ptr.element_size(), Some(8));
    let arr = Type::Array(Box::new(Type::Int), 5);
    assert_eq!(arr.element_size(), Some(4));
    assert_eq!(arr.decayed(), Type::Ptr(Box::new(Type::Int)));
}

#[rstest]
#[case(Type::Int, "int")]
#[case(Type::Ptr(Box::new(Type::Int)), "int*")]
#[case(Type::Ptr(Box::new(Type::Ptr(Box::new(Type::Int)))), "int**")]
#[case(Type::Array(Box::new(Type::Int), 5), "int[5]")]
fn type_display(#[case] ty: Type, #[case] rendered: &str) {
    assert_eq!(ty.to_string(), rendered);
}

#[test]
fn layout_packs_in_declaration_order() {
    let mut layout = FrameLayout::new();
    assert_eq!(layout.reserve(4, 4), 0);
    assert_eq!(layout.reserve(4, 4), 4);
    assert_eq!(layout.reserve(8, 8), 8);
    assert_eq!(layout.frame_size(), 16);
}

#[test]
fn layout_aligns_pointers_after_int() {
    let mut layout = FrameLayout::new();
    assert_eq!(layout.reserve(4, 4), 0);
    assert_eq!(layout.reserve(8, 8), 8);
    assert_eq!(layout.reserve(4, 4), 16);
    assert_eq!(layout.frame_size(), 32);
}

#[test]
fn empty_frame_is_empty() {
    assert_eq!(FrameLayout::new().frame_size(), 0);
}

#[test]
fn scope_rejects_duplicate_in_same_scope() {
    let mut layout = FrameLayout::new();
    let mut scopes = ScopeStack::new("f");
    scopes
        .declare("x", Type::Int, Storage::Local, &mut layout)
        .unwrap();
    assert_eq!(
        scopes.declare("x", Type::Int, Storage::Local, &mut layout),
        Err(CompileError::DuplicateDeclaration {
            name: "x".to_owned(),
            scope: "function `f`".to_owned(),
        })
    );
}

#[test]
fn scope_allows_shadowing_and_restores_on_exit() {
    let mut layout = FrameLayout::new();
    let mut scopes = ScopeStack::new("f");
    let outer = scopes
        .declare("x", Type::Int, Storage::Local, &mut layout)
        .unwrap();
    scopes.enter_scope();
    let inner = scopes
        .declare("x", Type::Int, Storage::Local, &mut layout)
        .unwrap();
    assert_ne!(outer, inner);
    assert_eq!(scopes.resolve("x").unwrap().offset, inner);
    scopes.exit_scope();
    assert_eq!(scopes.resolve("x").unwrap().offset, outer);
    assert!(scopes.resolve("y").is_none());
}

#[test]
fn duplicate_function_is_rejected() {
    let err = compile("int f() { return 0; } int f() { return 1; } int main() { return 0; }")
        .unwrap_err();
    assert!(matches!(err, CompileError::DuplicateDeclaration { name, .. } if name == "f"));
}

#[test]
fn duplicate_local_is_rejected() {
    let err = compile("int main() { int x; int x; return 0; }").unwrap_err();
    assert!(matches!(err, CompileError::DuplicateDeclaration { name, .. } if name == "x"));
}

#[test]
fn missing_main_is_rejected() {
    let err = compile("int f() { return 0; }").unwrap_err();
    assert!(matches!(err, CompileError::UnknownIdentifier { name } if name == "main"));
}

#[test]
fn unknown_variable_is_rejected() {
    let err = compile("int main() { return y; }").unwrap_err();
    assert!(matches!(err, CompileError::UnknownIdentifier { name } if name == "y"));
}

#[test]
fn literal_is_not_an_lvalue() {
    let err = compile("int main() { 5 = 3; return 0; }").unwrap_err();
    assert!(matches!(err, CompileError::InvalidLvalue { .. }));
}

#[test]
fn dereferencing_an_int_is_rejected() {
    let err = compile("int main() { int x; return *x; }").unwrap_err();
    assert!(matches!(err, CompileError::TypeMismatch { .. }));
}

#[test]
fn void_return_value_cannot_be_used() {
    let err = compile("void f() { return; } int main() { int x = f(); return x; }").unwrap_err();
    assert!(matches!(err, CompileError::TypeMismatch { .. }));
}

#[test]
fn arity_mismatch_is_rejected() {
    let err = compile("int f(int x) { return x; } int main() { return f(1, 2); }").unwrap_err();
    assert!(matches!(err, CompileError::TypeMismatch { .. }));
}

#[test]
fn exit_status_comes_from_main() {
    let (status, output) = run("int main() { return 42; }").unwrap();
    assert_eq!(status, 42);
    assert_eq!(output, "");
}

#[test]
fn falling_off_the_end_returns_zero() {
    let (status, _) = run("int main() { int x = 1; }").unwrap();
    assert_eq!(status, 0);
}

#[test]
fn pointer_arithmetic_scales_by_element_size() {
    let (status, _) = run(
        "int main() {
            int arr[3] = {10, 20, 30};
            int *p = arr;
            return *(p + 2) - arr[1] - arr[0];
        }",
    )
    .unwrap();
    assert_eq!(status, 0);
}

#[test]
fn compound_assignment_computes_the_address_once() {
    // a side effect in the subscript must run exactly once
    let (status, _) = run(
        "int main() {
            int arr[3] = {5, 6, 7};
            int i = 1;
            arr[i++] += 10;
            return arr[1] * 100 + i * 10 + arr[2];
        }",
    )
    .unwrap();
    assert_eq!(status, 1627);
}

#[test]
fn increment_through_a_side_effecting_place() {
    let (status, _) = run(
        "int main() {
            int arr[2] = {40, 50};
            int i = 0;
            int old = arr[i++]++;
            return old * 1000 + arr[0] * 10 + i;
        }",
    )
    .unwrap();
    assert_eq!(status, 40411);
}

#[test]
fn pointer_difference_counts_elements() {
    let (status, _) = run(
        "int main() {
            int arr[4];
            int *p = &arr[3];
            return p - arr;
        }",
    )
    .unwrap();
    assert_eq!(status, 3);
}

#[test]
fn division_by_zero_is_trapped() {
    let program = compile("int main() { int z = 0; return 1 / z; }").unwrap();
    let mut output = Vec::new();
    assert_eq!(
        program.execute(&mut output),
        Err(RuntimeError::DivisionByZero)
    );
}

#[test]
fn runaway_recursion_overflows() {
    let program = compile("int f(int n) { return f(n + 1); } int main() { return f(0); }").unwrap();
    let mut output = Vec::new();
    assert_eq!(
        program.execute(&mut output),
        Err(RuntimeError::StackOverflow {
            max_depth: ir::MAX_CALL_DEPTH,
        })
    );
}
