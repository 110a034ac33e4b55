//! Rust source rendering of test cases.

use std::fmt::Write;

use super::statement::{Statement, VarId};
use super::test_case::TestCase;
use crate::schema::{Callable, EnumVariant, OutputConfig, Type};

/// Name of the test function for `tc`.
pub fn test_name(tc: &TestCase, output: &OutputConfig) -> String {
    format!("{}_{}", output.test_prefix, tc.id())
}

/// One `#[test]` function.
pub fn render_test(tc: &TestCase, output: &OutputConfig) -> String {
    let mut out = String::new();
    out.push_str("#[test]\n#[allow(unused_mut, unused_variables)]\n");
    let _ = writeln!(out, "fn {}() {{", test_name(tc, output));
    if let Some(hook) = &output.monitor_hook {
        let _ = writeln!(out, "    {hook}({});", tc.id());
    }
    for stmt in tc.stmts() {
        let _ = writeln!(out, "    {}", render_stmt(tc, stmt));
    }
    out.push_str("}\n");
    out
}

/// A test module holding every test of the batch.
pub fn render_module(tests: &[TestCase], output: &OutputConfig) -> String {
    let mut out = String::from("// @generated by covgen\n");
    for tc in tests {
        out.push('\n');
        out.push_str(&render_test(tc, output));
    }
    out
}

fn render_stmt(tc: &TestCase, stmt: &Statement) -> String {
    let expr = match stmt {
        Statement::Invoke { callable, args, .. } => render_call(callable, args),
        Statement::Literal { value, .. } => value.to_string(),
        Statement::Ref {
            target,
            mutable: true,
            ..
        } => format!("&mut {target}"),
        Statement::Ref { target, .. } => format!("&{target}"),
        Statement::ArrayInit { elements, .. } => format!("[{}]", join(elements)),
        Statement::TupleInit { elements, .. } if elements.len() == 1 => {
            format!("({},)", elements[0])
        }
        Statement::TupleInit { elements, .. } => format!("({})", join(elements)),
        Statement::TupleAccess { tuple, index, .. } => format!("{tuple}.{index}"),
    };
    match stmt.returns() {
        None => format!("{expr};"),
        Some(var) => match (stmt, tc.var_type(var)) {
            (Statement::ArrayInit { elements, .. }, Some(ty)) if elements.is_empty() => {
                format!("let mut {var}: {ty} = {expr};")
            }
            _ => format!("let mut {var} = {expr};"),
        },
    }
}

fn render_call(callable: &Callable, args: &[VarId]) -> String {
    let path = |ty: &Type, name: &str| format!("{}::{}", ty.base_name(), name);
    match callable {
        Callable::StaticFunction(c) => format!("{}({})", path(&c.parent, &c.name), join(args)),
        Callable::Method(c) => format!("{}({})", path(&c.parent, &c.name), join(args)),
        Callable::Function(c) => format!("{}({})", c.name, join(args)),
        Callable::StructInit(c) => {
            let name = c.return_type.base_name();
            if c.params.iter().all(|p| p.name.is_some()) && !c.params.is_empty() {
                format!("{name} {{ {} }}", fields(c.params.iter().map(|p| p.name.as_deref()), args))
            } else if c.params.is_empty() {
                name
            } else {
                format!("{name}({})", join(args))
            }
        }
        Callable::EnumInit(c) => {
            let name = path(&c.return_type, c.variant.name());
            match &c.variant {
                EnumVariant::Unit(_) => name,
                EnumVariant::Tuple(..) => format!("{name}({})", join(args)),
                EnumVariant::Struct(_, params) => format!(
                    "{name} {{ {} }}",
                    fields(params.iter().map(|p| p.name.as_deref()), args)
                ),
            }
        }
        Callable::FieldAccess(c) => match args.first() {
            Some(owner) => format!("{owner}.{}", c.name),
            None => c.name.clone(),
        },
    }
}

fn fields<'a>(names: impl Iterator<Item = Option<&'a str>>, args: &[VarId]) -> String {
    names
        .zip(args)
        .enumerate()
        .map(|(i, (name, arg))| match name {
            Some(name) => format!("{name}: {arg}"),
            None => format!("{i}: {arg}"),
        })
        .collect::<Vec<_>>()
        .join(", ")
}

fn join(vars: &[VarId]) -> String {
    vars.iter().map(VarId::to_string).collect::<Vec<_>>().join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compute::chromosome::PrimValue;
    use crate::compute::chromosome::fixtures;
    use crate::schema::{ArrayType, IntTy, Prim, TypeBinding};
    use std::sync::Arc;

    fn find(name: &str) -> Arc<Callable> {
        fixtures::catalog()
            .callables()
            .iter()
            .find(|c| c.name() == name)
            .cloned()
            .unwrap()
    }

    fn literal(tc: &mut TestCase, v: i128) -> VarId {
        let var = tc.new_var(Type::Prim(Prim::Int(IntTy::I32)));
        tc.push_stmt(Statement::Literal {
            value: PrimValue::Int(IntTy::I32, v),
            returns: var,
        });
        var
    }

    #[test]
    fn test_renders_calls_and_references() {
        let mut tc = TestCase::new(7);
        let x = literal(&mut tc, 1);
        let y = literal(&mut tc, -2);
        let p = tc.new_var(fixtures::point());
        tc.push_stmt(Statement::Invoke {
            callable: find("new"),
            args: vec![x, y],
            binding: TypeBinding::new(),
            returns: Some(p),
        });
        let r = tc.new_var(Type::reference(fixtures::point(), true));
        tc.push_stmt(Statement::Ref {
            target: p,
            mutable: true,
            returns: r,
        });
        tc.push_stmt(Statement::Invoke {
            callable: find("translate"),
            args: vec![r, x],
            binding: TypeBinding::new(),
            returns: None,
        });

        let output = OutputConfig::default();
        let code = render_test(&tc, &output);
        let expected = "#[test]\n\
            #[allow(unused_mut, unused_variables)]\n\
            fn covgen_test_7() {\n    \
            covgen_monitor::set_test_id(7);\n    \
            let mut v0 = 1i32;\n    \
            let mut v1 = -2i32;\n    \
            let mut v2 = geom::Point::new(v0, v1);\n    \
            let mut v3 = &mut v2;\n    \
            geom::Point::translate(v3, v0);\n\
            }\n";
        assert_eq!(code, expected);
    }

    #[test]
    fn test_struct_literal_and_containers() {
        let mut tc = TestCase::new(1);
        let a = tc.new_var(fixtures::point());
        let b = tc.new_var(fixtures::point());
        let line = tc.new_var(fixtures::line());
        let stmt = Statement::Invoke {
            callable: find("geom::Line"),
            args: vec![a, b],
            binding: TypeBinding::new(),
            returns: Some(line),
        };
        assert_eq!(
            render_stmt(&tc, &stmt),
            "let mut v2 = geom::Line { a: v0, b: v1 };"
        );

        let empty = tc.new_var(Type::Array(Box::new(ArrayType {
            ty: Type::Prim(Prim::Bool),
            length: 0,
        })));
        let stmt = Statement::ArrayInit {
            elements: vec![],
            returns: empty,
        };
        assert_eq!(render_stmt(&tc, &stmt), "let mut v3: [bool; 0] = [];");

        let single = tc.new_var(Type::Prim(Prim::Bool));
        let stmt = Statement::TupleInit {
            elements: vec![a],
            returns: single,
        };
        assert_eq!(render_stmt(&tc, &stmt), "let mut v4 = (v0,);");
    }

    #[test]
    fn test_module_without_hook() {
        let output = OutputConfig {
            monitor_hook: None,
            test_prefix: "t".into(),
            ..OutputConfig::default()
        };
        let tests = vec![TestCase::new(1), TestCase::new(2)];
        let module = render_module(&tests, &output);
        assert!(module.contains("fn t_1() {\n}\n"));
        assert!(module.contains("fn t_2() {\n}\n"));
        assert!(!module.contains("set_test_id"));
    }
}
