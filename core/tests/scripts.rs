//! End-to-end scenarios driving the public API the way a host would:
//! compile source, run it, call back in, collect garbage.

use pretty_assertions::assert_eq;

use quill_core::lexer::Token;
use quill_core::{Value, Vm, compile, stdlib};

fn run(source: &str) -> (Vm, Result<Value, Value>) {
    let mut vm = Vm::new();
    stdlib::install(&mut vm).expect("stdlib installs");
    let mut token = Token::default();
    compile(source, &mut token, vm.program_mut()).expect("compile succeeds");
    let result = vm.run();
    (vm, result)
}

fn returns(source: &str) -> Value {
    run(source).1.expect("script succeeds")
}

fn displayed(source: &str) -> String {
    let (vm, result) = run(source);
    vm.display_value(result.expect("script succeeds"))
}

#[test]
fn fibonacci() {
    assert_eq!(
        returns(
            "function fib(n) { if (n < 2) { return n; } return fib(n - 1) + fib(n - 2); } \
             return fib(10);"
        ),
        Value::Number(55.0)
    );
}

#[test]
fn closure_counter() {
    assert_eq!(
        returns(
            "let mk = function() { let i = 0; return function() { i += 1; return i; }; }; \
             let c = mk(); c(); c(); return c();"
        ),
        Value::Number(3.0)
    );
}

#[test]
fn try_catch_carries_the_thrown_value() {
    assert_eq!(
        displayed(r#"let r; try { throw "oops"; r = 1; } catch (e) { r = e; } return r;"#),
        "oops"
    );
}

#[test]
fn object_iteration_sums_values() {
    assert_eq!(
        returns("let o = {a: 1, b: 2, c: 3}; let s = 0; for (let k of o) { s += k; } return s;"),
        Value::Number(6.0)
    );
}

#[test]
fn spread_arguments() {
    assert_eq!(
        returns(
            "function sum(...xs) { let s = 0; for (let x of xs) { s += x; } return s; } \
             return sum(...[1, 2, 3], 4);"
        ),
        Value::Number(10.0)
    );
}

#[test]
fn short_circuit_or_skips_the_bump() {
    let (vm, result) = run(
        "let n = 0; function bump() { n += 1; return true; } \
         let r = true || bump(); return [n, r];",
    );
    let value = result.unwrap();
    let gc = value.as_gc().expect("array");
    assert_eq!(
        vm.heap().array(gc).as_slice(),
        &[Value::Number(0.0), Value::Boolean(true)]
    );
}

#[test]
fn programs_compose_incrementally() {
    // the REPL pattern: one VM, growing source, repeated compile + run
    let mut vm = Vm::new();
    stdlib::install(&mut vm).unwrap();
    let mut token = Token::default();
    let mut source = String::new();

    source.push_str("let total = 0;");
    compile(&source, &mut token, vm.program_mut()).unwrap();
    vm.run().unwrap();
    let pc = vm.pc();
    assert_eq!(pc, vm.program().len());

    source.push_str(" total += 40;");
    compile(&source, &mut token, vm.program_mut()).unwrap();
    vm.run().unwrap();

    source.push_str(" total += 2;");
    compile(&source, &mut token, vm.program_mut()).unwrap();
    vm.run().unwrap();

    assert_eq!(vm.get_variable("total"), Ok(Value::Number(42.0)));
}

#[test]
fn repl_style_rollback_recovers_from_errors() {
    let mut vm = Vm::new();
    let mut token = Token::default();
    let mut source = String::from("let a = 1;");
    compile(&source, &mut token, vm.program_mut()).unwrap();
    vm.run().unwrap();

    // snapshot, fail, roll back
    let source_len = source.len();
    let token_backup = token;
    let code_len = vm.program().len();
    let xref_len = vm.program().xref().len();
    let pc = vm.pc();

    source.push_str(" let b = ;");
    assert!(compile(&source, &mut token, vm.program_mut()).is_err());
    source.truncate(source_len);
    token = token_backup;
    vm.program_mut().truncate(code_len, xref_len);
    vm.set_pc(pc);

    // the session continues unharmed
    source.push_str(" a += 41;");
    compile(&source, &mut token, vm.program_mut()).unwrap();
    vm.run().unwrap();
    assert_eq!(vm.get_variable("a"), Ok(Value::Number(42.0)));
}

#[test]
fn bytecode_roundtrips_through_raw_dumps() {
    use quill_core::Program;

    let mut vm = Vm::new();
    let mut token = Token::default();
    compile(
        "function f(x) { return x * 2; } return f(21);",
        &mut token,
        vm.program_mut(),
    )
    .unwrap();

    // the on-disk format is the raw buffer and raw little-endian xref
    let code = vm.program().code().to_vec();
    let xref_bytes = vm.program().xref_bytes();

    let program = Program::from_parts(code, Program::xref_from_bytes(&xref_bytes));
    let mut loaded = Vm::with_program(program);
    assert_eq!(loaded.run(), Ok(Value::Number(42.0)));
}

#[test]
fn deep_recursion_and_unwind() {
    let (vm, result) = run(
        "function sink(n) { if (n == 0) { throw \"done\"; } return sink(n - 1); } \
         let r; try { sink(64); } catch (e) { r = e; } return r;",
    );
    assert_eq!(vm.display_value(result.unwrap()), "done");
}

#[test]
fn gc_between_runs_keeps_the_world_alive() {
    let (mut vm, result) = run(
        "let data = {name: \"qu\" + \"ill\", list: [1, 2, 3]}; \
         function get() { return data.name; } return get();",
    );
    assert_eq!(vm.display_value(result.unwrap()), "quill");
    for _ in 0..3 {
        vm.gc();
    }
    let again = vm.call_by_name("get", &[]).unwrap();
    assert_eq!(vm.display_value(again), "quill");
}

#[test]
fn host_registered_natives_participate() {
    fn repeat(vm: &mut Vm, arguments: &[Value]) -> Result<Value, Value> {
        let [text, Value::Number(times)] = arguments else {
            return Err(Value::Scripture("repeat needs a string and a count"));
        };
        let text = vm.display_value(*text);
        Ok(vm.heap_mut().alloc_string(text.repeat(*times as usize)))
    }

    let mut vm = Vm::new();
    vm.declare_variable("repeat", Value::Native(repeat)).unwrap();
    let mut token = Token::default();
    compile(
        r#"return repeat("ab", 3);"#,
        &mut token,
        vm.program_mut(),
    )
    .unwrap();
    let result = vm.run().unwrap();
    assert_eq!(vm.display_value(result), "ababab");
}

#[test]
fn uncaught_errors_report_to_the_host() {
    let (vm, result) = run("let x = 1; return x.member;");
    let error = result.unwrap_err();
    assert_eq!(
        vm.display_value(error),
        "Must be array[number] or object[string]"
    );
}
