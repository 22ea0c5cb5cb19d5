//! End-to-end pipeline scenarios: source text in, exit code and output
//! out.

mod common;

use common::{assert_error_containing, assert_prints, assert_returns, assert_traps, run_program};
use upp_compile::{Compiler, ExitCode};

// =============================================================================
// A: Minimal programs, traps and error reporting
// =============================================================================

#[test]
fn trivial_function_returns_zero() {
    let source = "\
main :: () -> i32
    return 0
";
    let (_, compilation) = Compiler::compile_text(source, true);
    assert!(compilation.is_clean());
    // One module with one comptime definition named main.
    let ast = &compilation.parse.ast;
    let upp_language::NodeKind::Module { definitions, .. } = &ast.node(compilation.parse.root).kind
    else {
        panic!("root is not a module");
    };
    assert_eq!(definitions.len(), 1);
    let upp_language::NodeKind::Definition {
        is_comptime, name, ..
    } = &ast.node(definitions[0]).kind
    else {
        panic!("expected a definition");
    };
    assert!(*is_comptime);
    assert_eq!(upp_base::identifier_pool().resolve_owned(*name), "main");

    let (exit, value, _) = run_program(source);
    assert_eq!(exit, ExitCode::Success);
    assert_eq!(value, 0);
}

#[test]
fn division_by_zero_traps_at_runtime() {
    assert_traps(
        "\
main :: () -> i32
    x := 10
    y := 0
    return x / y
",
        ExitCode::DivByZero,
    );
}

#[test]
fn unresolved_symbol_is_a_single_semantic_error() {
    let (_, compilation) = Compiler::compile_text(
        "\
main :: () -> i32
    return foo
",
        true,
    );
    assert_eq!(compilation.parse.errors.len(), 0);
    assert_eq!(compilation.semantic.errors.len(), 1);
    assert!(compilation.semantic.errors[0]
        .message
        .contains("unresolved identifier 'foo'"));
    assert!(compilation.program.is_none(), "no bytecode on errors");
}

// =============================================================================
// B: Arithmetic, control flow, calls
// =============================================================================

#[test]
fn integer_arithmetic_with_precedence() {
    assert_returns(
        "\
main :: () -> i32
    return 2 + 3 * 4 - 10 % 3
",
        13,
    );
}

#[test]
fn comparison_and_logic() {
    assert_returns(
        "\
main :: () -> i32
    a := 3 < 5
    b := 5 <= 5
    if a && b
        return 1
    return 0
",
        1,
    );
}

#[test]
fn nested_if_else_chains() {
    assert_returns(
        "\
classify :: (x: i32) -> i32
    if x < 0
        return 0
    else if x == 0
        return 1
    else
        return 2
main :: () -> i32
    return classify(0 - 5) + classify(0) * 10 + classify(7) * 100
",
        210,
    );
}

#[test]
fn while_with_break_and_continue() {
    assert_returns(
        "\
main :: () -> i32
    sum := 0
    i := 0
    while true
        i += 1
        if i > 10
            break
        if i % 2 == 0
            continue
        sum += i
    return sum
",
        25,
    );
}

#[test]
fn labeled_block_break() {
    assert_returns(
        "\
main :: () -> i32
    x := 0
    outer:
        x = 1
        break outer
        x = 2
    return x
",
        1,
    );
}

#[test]
fn mutual_recursion() {
    assert_returns(
        "\
is_even :: (n: i32) -> i32
    if n == 0
        return 1
    return is_odd(n - 1)
is_odd :: (n: i32) -> i32
    if n == 0
        return 0
    return is_even(n - 1)
main :: () -> i32
    return is_even(10) + is_odd(7)
",
        2,
    );
}

#[test]
fn named_call_arguments_reorder() {
    assert_returns(
        "\
power_base :: (base: i32, bonus: i32) -> i32
    return base * 10 + bonus
main :: () -> i32
    return power_base(bonus = 2, base = 4)
",
        42,
    );
}

#[test]
fn void_function_with_defer_runs_at_exit() {
    assert_prints(
        "\
log_twice :: ()
    defer print_i32(2)
    print_i32(1)
main :: () -> i32
    log_twice()
    return 0
",
        "12",
    );
}

#[test]
fn defer_runs_on_return_from_nested_block() {
    assert_prints(
        "\
work :: () -> i32
    defer print_i32(9)
    if true
        return 1
    return 0
main :: () -> i32
    work()
    return 0
",
        "9",
    );
}

// =============================================================================
// C: Types — structs, enums, arrays, pointers
// =============================================================================

#[test]
fn struct_definition_and_member_access() {
    assert_returns(
        "\
Point :: struct
    x: i32
    y: i32
main :: () -> i32
    p := Point.{40, 2}
    return p.x + p.y
",
        42,
    );
}

#[test]
fn struct_initializer_with_named_members() {
    assert_returns(
        "\
Point :: struct
    x: i32
    y: i32
main :: () -> i32
    p := Point.{y = 2, x = 40}
    return p.x + p.y
",
        42,
    );
}

#[test]
fn struct_member_assignment() {
    assert_returns(
        "\
Counter :: struct
    value: i32
main :: () -> i32
    c := Counter.{0}
    c.value = 41
    c.value += 1
    return c.value
",
        42,
    );
}

#[test]
fn enum_switch_covers_all_variants() {
    assert_returns(
        "\
Color :: enum
    RED
    GREEN
    BLUE
main :: () -> i32
    c := Color.GREEN
    switch c
        case Color.RED
            return 1
        case Color.GREEN
            return 2
        case Color.BLUE
            return 3
",
        2,
    );
}

#[test]
fn enum_switch_missing_case_needs_default() {
    assert_error_containing(
        "\
Color :: enum
    RED
    GREEN
main :: () -> i32
    c := Color.RED
    switch c
        case Color.RED
            return 1
    return 0
",
        "switch does not cover",
    );
}

#[test]
fn auto_enum_infers_from_context() {
    assert_returns(
        "\
Color :: enum
    RED
    GREEN
main :: () -> i32
    c: Color = .GREEN
    if c == .GREEN
        return 1
    return 0
",
        1,
    );
}

#[test]
fn arrays_index_and_size() {
    assert_returns(
        "\
main :: () -> i32
    values := .[10, 20, 12]
    sum := 0
    i := 0
    while i < values.size
        sum += values[i]
        i += 1
    return sum
",
        42,
    );
}

#[test]
fn array_out_of_bounds_traps() {
    assert_traps(
        "\
main :: () -> i32
    values := .[1, 2, 3]
    i := 5
    return values[i]
",
        ExitCode::OutOfBounds,
    );
}

#[test]
fn pointers_read_and_write_through() {
    assert_returns(
        "\
main :: () -> i32
    x := 1
    p := *x
    &p = 42
    return x
",
        42,
    );
}

#[test]
fn pointer_equality_compares_addresses() {
    assert_returns(
        "\
main :: () -> i32
    x := 1
    a := *x
    b := *x
    if a *== b
        return 1
    return 0
",
        1,
    );
}

#[test]
fn heap_allocation_and_delete() {
    assert_returns(
        "\
main :: () -> i32
    p := new i32
    &p = 42
    result := &p
    delete p
    return result
",
        42,
    );
}

#[test]
fn slice_allocation_indexing_and_size() {
    assert_returns(
        "\
main :: () -> i32
    values := new[4] i32
    values[0] = 40
    values[3] = 2
    total := values[0] + values[3] + values.size
    delete values
    return total
",
        46,
    );
}

#[test]
fn null_pointer_dereference_traps() {
    assert_traps(
        "\
main :: () -> i32
    p: *i32 = null
    return &p
",
        ExitCode::NullDeref,
    );
}

#[test]
fn cast_between_numeric_types() {
    assert_returns(
        "\
main :: () -> i32
    f := 41.9
    return cast(i32) f + 1
",
        42,
    );
}

// =============================================================================
// D: Comptime
// =============================================================================

#[test]
fn comptime_constant_folds() {
    assert_returns(
        "\
SIZE :: 6 * 7
main :: () -> i32
    return SIZE
",
        42,
    );
}

#[test]
fn comptime_value_usable_as_array_size() {
    assert_returns(
        "\
SIZE :: 3
main :: () -> i32
    values: [SIZE]i32 = .[1, 2, 3]
    return values.size
",
        3,
    );
}

#[test]
fn comptime_runs_functions_on_the_vm() {
    assert_returns(
        "\
fib :: (n: i32) -> i32
    if n < 2
        return n
    return fib(n - 1) + fib(n - 2)
ANSWER :: fib(10)
main :: () -> i32
    return ANSWER
",
        55,
    );
}

#[test]
fn bake_expression_folds_in_function_body() {
    assert_returns(
        "\
square :: (x: i32) -> i32
    return x * x
main :: () -> i32
    return bake square(6) + 6
",
        42,
    );
}

#[test]
fn cyclic_comptime_dependency_is_reported() {
    assert_error_containing(
        "\
A :: B + 1
B :: A + 1
main :: () -> i32
    return A
",
        "cyclic dependency",
    );
}

// =============================================================================
// E: Modules and globals
// =============================================================================

#[test]
fn module_path_lookup() {
    assert_returns(
        "\
math :: module
    TAU_ISH :: 6
    double :: (x: i32) -> i32
        return x * 2
main :: () -> i32
    return math~double(math~TAU_ISH) * 3 + 6
",
        42,
    );
}

#[test]
fn path_lookup_through_non_module_errors() {
    assert_error_containing(
        "\
value :: 1
main :: () -> i32
    return value~inner
",
        "module",
    );
}

#[test]
fn globals_initialise_and_mutate() {
    assert_returns(
        "\
counter := 40
main :: () -> i32
    counter += 2
    return counter
",
        42,
    );
}

// =============================================================================
// F: Hardcoded functions
// =============================================================================

#[test]
fn print_string_reads_constant_data() {
    assert_prints(
        "\
main :: () -> i32
    print_string(\"hello\")
    print_line()
    return 0
",
        "hello\n",
    );
}

#[test]
fn read_i32_consumes_scripted_input() {
    let host = upp_compile::BufferedHost {
        int_inputs: vec![40, 2],
        ..Default::default()
    };
    let (exit, value, _) = common::run_program_with_host(
        "\
main :: () -> i32
    a := read_i32()
    b := read_i32()
    return a + b
",
        host,
    );
    assert_eq!(exit, ExitCode::Success);
    assert_eq!(value, 42);
}

#[test]
fn random_i32_uses_host_values() {
    let host = upp_compile::BufferedHost {
        random_values: vec![42],
        ..Default::default()
    };
    let (exit, value, _) = common::run_program_with_host(
        "\
main :: () -> i32
    return random_i32()
",
        host,
    );
    assert_eq!(exit, ExitCode::Success);
    assert_eq!(value, 42);
}

// =============================================================================
// G: Error paths
// =============================================================================

#[test]
fn type_mismatch_reports_both_types() {
    assert_error_containing(
        "\
main :: () -> i32
    x: bool = 5
    return 0
",
        "type mismatch",
    );
}

#[test]
fn wrong_argument_count_is_reported() {
    assert_error_containing(
        "\
add :: (a: i32, b: i32) -> i32
    return a + b
main :: () -> i32
    return add(1)
",
        "wrong number of arguments",
    );
}

#[test]
fn non_bool_condition_is_reported() {
    assert_error_containing(
        "\
main :: () -> i32
    if 1
        return 1
    return 0
",
        "conditions must be bool",
    );
}

#[test]
fn redefinition_in_same_scope_is_reported() {
    assert_error_containing(
        "\
main :: () -> i32
    x := 1
    x := 2
    return x
",
        "redefinition",
    );
}

#[test]
fn parser_recovers_and_still_reports_later_lines() {
    let messages = common::compile_errors(
        "\
main :: () -> i32
    ??? !!!
    return foo
",
    );
    assert!(messages.len() >= 2, "expected both errors, got {messages:?}");
}

#[test]
fn missing_return_is_reported() {
    assert_error_containing(
        "\
main :: () -> i32
    x := 1
",
        "return",
    );
}
