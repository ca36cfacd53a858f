use super::Visit;
use hcl::{
    template::{Directive, Element},
    Expression, Identifier, ObjectKey, Operation, Template, TraversalOperator,
};

/// Something an expression depends on that has to come from the evaluation context
#[derive(Debug, Clone, PartialEq)]
pub enum Reference {
    /// A free variable (the root of a traversal such as `self.encrypted`)
    Variable(String),
    /// Any function call
    Function,
}

/// Recursively visit all free [Reference]s
///
/// Variables bound by `for` expressions and `%{ for }` directives are not reported inside
/// their scope.
pub trait VisitReferences {
    fn visit_references(&self, visitor: &mut dyn Visit<Reference>);
}

impl VisitReferences for Expression {
    fn visit_references(&self, visitor: &mut dyn Visit<Reference>) {
        match self {
            Expression::Variable(variable) => {
                visitor.visit(&Reference::Variable(variable.as_str().to_string()));
            }
            Expression::Traversal(traversal) => {
                traversal.expr.visit_references(visitor);
                for operator in &traversal.operators {
                    if let TraversalOperator::Index(index) = operator {
                        index.visit_references(visitor);
                    }
                }
            }
            Expression::Array(array) => {
                for expr in array {
                    expr.visit_references(visitor);
                }
            }
            Expression::Object(object) => {
                for (key, value) in object {
                    if let ObjectKey::Expression(key) = key {
                        key.visit_references(visitor);
                    }
                    value.visit_references(visitor);
                }
            }
            Expression::TemplateExpr(template_expr) => {
                // an unparsable template fails again, and is reported, on evaluation
                if let Ok(template) = Template::from_expr(template_expr) {
                    template.visit_references(visitor);
                }
            }
            Expression::FuncCall(func_call) => {
                visitor.visit(&Reference::Function);
                for arg in &func_call.args {
                    arg.visit_references(visitor);
                }
            }
            Expression::Parenthesis(expr) => {
                expr.visit_references(visitor);
            }
            Expression::Conditional(cond) => {
                cond.cond_expr.visit_references(visitor);
                cond.true_expr.visit_references(visitor);
                cond.false_expr.visit_references(visitor);
            }
            Expression::Operation(operation) => match &**operation {
                Operation::Binary(binop) => {
                    binop.lhs_expr.visit_references(visitor);
                    binop.rhs_expr.visit_references(visitor);
                }
                Operation::Unary(unop) => {
                    unop.expr.visit_references(visitor);
                }
            },
            Expression::ForExpr(forexpr) => {
                forexpr.collection_expr.visit_references(visitor);

                let mut scoped = Scoped::new(forexpr.key_var.as_ref(), &forexpr.value_var, visitor);
                forexpr
                    .key_expr
                    .iter()
                    .for_each(|e| e.visit_references(&mut scoped));
                forexpr.value_expr.visit_references(&mut scoped);
                forexpr
                    .cond_expr
                    .iter()
                    .for_each(|e| e.visit_references(&mut scoped));
            }
            _ => {}
        }
    }
}

impl VisitReferences for Template {
    fn visit_references(&self, visitor: &mut dyn Visit<Reference>) {
        for element in self.elements() {
            match element {
                Element::Interpolation(interpolation) => {
                    interpolation.expr.visit_references(visitor);
                }
                Element::Directive(directive) => match directive {
                    Directive::If(ifdir) => {
                        ifdir.cond_expr.visit_references(visitor);
                        ifdir.true_template.visit_references(visitor);
                        ifdir
                            .false_template
                            .iter()
                            .for_each(|t| t.visit_references(visitor));
                    }
                    Directive::For(fordir) => {
                        fordir.collection_expr.visit_references(visitor);
                        let mut scoped =
                            Scoped::new(fordir.key_var.as_ref(), &fordir.value_var, visitor);
                        fordir.template.visit_references(&mut scoped);
                    }
                },
                Element::Literal(_) => {}
            }
        }
    }
}

/// Hides variables bound by a `for` from the wrapped visitor
struct Scoped<'v> {
    bound: Vec<String>,
    visitor: &'v mut dyn Visit<Reference>,
}

impl<'v> Scoped<'v> {
    fn new(
        key_var: Option<&Identifier>,
        value_var: &Identifier,
        visitor: &'v mut dyn Visit<Reference>,
    ) -> Self {
        let bound = key_var
            .into_iter()
            .chain(std::iter::once(value_var))
            .map(|ident| ident.as_str().to_string())
            .collect();

        Self { bound, visitor }
    }
}

impl Visit<Reference> for Scoped<'_> {
    fn visit(&mut self, reference: &Reference) {
        if let Reference::Variable(name) = reference {
            if self.bound.contains(name) {
                return;
            }
        }

        self.visitor.visit(reference);
    }
}
