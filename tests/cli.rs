use std::io::Write;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::NamedTempFile;

fn script_file(source: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("create temp script");
    file.write_all(source.as_bytes()).expect("write script");
    file
}

fn lox() -> Command {
    Command::cargo_bin("lox-rs").expect("find lox-rs binary")
}

#[test]
fn empty_script_exits_zero_with_no_output() {
    let file = script_file("");
    lox()
        .arg(file.path())
        .assert()
        .success()
        .stdout(predicate::str::is_empty());
}

#[test]
fn arithmetic_and_string_concatenation_print_to_stdout() {
    let file = script_file("print 1 + 2 * 3;");
    lox()
        .arg(file.path())
        .assert()
        .success()
        .stdout("7\n");

    let file = script_file(r#"var a = "hi"; print a + " there";"#);
    lox()
        .arg(file.path())
        .assert()
        .success()
        .stdout("hi there\n");
}

#[test]
fn closures_capture_their_environment_across_calls() {
    let file = script_file(
        r#"
        fun make(n){ fun get(){ return n; } return get; }
        var g = make(3);
        print g();
        "#,
    );
    lox().arg(file.path()).assert().success().stdout("3\n");

    let file = script_file(
        r#"
        fun c(){ var i=0; fun inc(){ i=i+1; return i;} return inc;}
        var f=c();
        print f();
        print f();
        "#,
    );
    lox()
        .arg(file.path())
        .assert()
        .success()
        .stdout("1\n2\n");
}

#[test]
fn classes_bind_this_and_resolve_super_methods() {
    let file = script_file(
        r#"
        class A{ init(x){ this.x=x;} greet(){ print this.x;} }
        A("hi").greet();
        "#,
    );
    lox().arg(file.path()).assert().success().stdout("hi\n");

    let file = script_file(
        r#"
        class A{ f(){ return "A"; } }
        class B<A{ f(){ return super.f()+"B"; } }
        print B().f();
        "#,
    );
    lox().arg(file.path()).assert().success().stdout("AB\n");
}

#[test]
fn type_mismatch_is_a_runtime_error_exiting_70() {
    let file = script_file(r#"print 1 + "x";"#);
    lox()
        .arg(file.path())
        .assert()
        .code(70)
        .stderr(predicate::str::contains(
            "Operands must be two numbers or two strings",
        ));
}

#[test]
fn division_by_zero_is_a_runtime_error() {
    let file = script_file("print 1 / 0;");
    lox()
        .arg(file.path())
        .assert()
        .code(70)
        .stderr(predicate::str::contains("Division by zero"));
}

#[test]
fn redeclaration_in_the_same_scope_is_a_parse_time_diagnostic_exiting_65() {
    let file = script_file("{ var a; a = 1; var a; }");
    lox()
        .arg(file.path())
        .assert()
        .code(65)
        .stderr(predicate::str::contains(
            "Already a variable 'a' in this scope",
        ));
}

#[test]
fn return_outside_a_function_is_a_diagnostic() {
    let file = script_file("return 1;");
    lox()
        .arg(file.path())
        .assert()
        .code(65)
        .stderr(predicate::str::contains(
            "Can't return from top-level code",
        ));
}

#[test]
fn prior_print_output_survives_a_later_runtime_fault() {
    let file = script_file(r#"print "before"; print 1 / 0; print "after";"#);
    lox()
        .arg(file.path())
        .assert()
        .code(70)
        .stdout("before\n")
        .stdout(predicate::str::contains("after").not());
}

#[test]
fn missing_script_file_is_an_io_diagnostic_not_a_panic() {
    lox()
        .arg("/no/such/path/does-not-exist.lox")
        .assert()
        .failure()
        .code(predicate::ne(101))
        .stderr(predicate::str::is_empty().not());
}

#[test]
fn unknown_extra_arguments_print_usage_and_exit_64() {
    lox()
        .arg("one.lox")
        .arg("two.lox")
        .assert()
        .code(64)
        .stderr(predicate::str::contains("Usage:"));
}
