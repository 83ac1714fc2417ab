// Copyright 2025 STARGA Inc.
// Licensed under the Apache License, Version 2.0 (the “License”);
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at:
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an “AS IS” BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use netforge::template::{Template, TemplateError};
use netforge::types::{ParamValue, Params};

fn render(src: &str, params: &[(&str, ParamValue)]) -> String {
    let params: Params = params.iter().cloned().collect();
    Template::parse(src).expect("template parses").render(&params).text
}

#[test]
fn value_rendering_for_python() {
    let src = "f({{i}}, {{x}}, {{y}}, {{b}}, {{n}}, '{{s}}')";
    let out = render(
        src,
        &[
            ("i", 3.into()),
            ("x", 2.0.into()),
            ("y", 0.25.into()),
            ("b", true.into()),
            ("n", ParamValue::Null),
            ("s", "same".into()),
        ],
    );
    assert_eq!(out, "f(3, 2.0, 0.25, True, None, 'same')");
}

#[test]
fn optional_argument_pattern() {
    let src = "MaxPooling2D(pool_size={{pool_size}}{% if strides is not none %}, strides={{strides}}{% endif %})";
    assert_eq!(
        render(src, &[("pool_size", "(2, 2)".into())]),
        "MaxPooling2D(pool_size=(2, 2))"
    );
    assert_eq!(
        render(src, &[("pool_size", "(2, 2)".into()), ("strides", "".into())]),
        "MaxPooling2D(pool_size=(2, 2))"
    );
    assert_eq!(
        render(
            src,
            &[("pool_size", "(2, 2)".into()), ("strides", "(1, 1)".into())]
        ),
        "MaxPooling2D(pool_size=(2, 2), strides=(1, 1))"
    );
}

#[test]
fn elif_else_chain() {
    let src = "{% if a == 'leaky_relu' %}LeakyReLU(){% elif a is not none %}Activation('{{a}}'){% else %}Activation('linear'){% endif %}";
    assert_eq!(render(src, &[("a", "leaky_relu".into())]), "LeakyReLU()");
    assert_eq!(render(src, &[("a", "tanh".into())]), "Activation('tanh')");
    assert_eq!(render(src, &[]), "Activation('linear')");
}

#[test]
fn nested_blocks() {
    let src = "{% if a %}A{% if b %}B{% else %}b{% endif %}{% endif %}.";
    assert_eq!(render(src, &[("a", true.into()), ("b", 1.into())]), "AB.");
    assert_eq!(render(src, &[("a", true.into()), ("b", 0.into())]), "Ab.");
    assert_eq!(render(src, &[("a", false.into()), ("b", 1.into())]), ".");
}

#[test]
fn equality_compares_rendered_text() {
    let src = "{% if n == '3' %}three{% endif %}{% if n != 3 %}other{% endif %}";
    assert_eq!(render(src, &[("n", 3.into())]), "three");
    assert_eq!(render(src, &[("n", 4.into())]), "other");
    assert_eq!(render(src, &[]), "other");
}

#[test]
fn unresolved_placeholders_are_listed_once() {
    let tpl = Template::parse("{{a}} {{b}} {{a}}").unwrap();
    let out = tpl.render(&Params::new());
    assert_eq!(out.text, "{{a}} {{b}} {{a}}");
    assert_eq!(out.unresolved, vec!["a".to_string(), "b".to_string()]);
}

#[test]
fn stray_braces_are_text() {
    assert_eq!(render("{'k': {{v}}}", &[("v", 1.into())]), "{'k': 1}");
}

#[test]
fn malformed_templates_are_rejected() {
    assert!(matches!(
        Template::parse("{% if a %}x"),
        Err(TemplateError::Unclosed(_))
    ));
    assert!(matches!(
        Template::parse("x{% endif %}"),
        Err(TemplateError::Unmatched(_))
    ));
    assert!(matches!(
        Template::parse("{% for x in y %}{% endif %}"),
        Err(TemplateError::UnknownTag(_))
    ));
    assert!(matches!(
        Template::parse("{% if %}x{% endif %}"),
        Err(TemplateError::BadCondition(_))
    ));
    assert!(matches!(
        Template::parse("{{ not a name }}"),
        Err(TemplateError::BadPlaceholder(_))
    ));
}
