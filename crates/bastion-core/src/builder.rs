//! Builds an executable `Schema` from declarations, resolvers and directive
//! implementations.
//!
//! Building is where every configuration problem surfaces: unknown or
//! misplaced directives, unknown types, resolvers for undeclared fields. A
//! schema that builds never fails at request time because of its own shape.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_graphql_parser::types::Type;
use tracing::{debug, info};

use bastion_contracts::{
    directive::Location,
    error::{BastionError, BastionResult},
};

use crate::enforce::EnforcedResolver;
use crate::inputs::{ArgumentEnforcer, InputPlans, InputValuePlan};
use crate::resolver::{PropertyResolver, Resolver, ResolverMap};
use crate::schema::{
    parse_type, underlying_type, CompiledArgument, CompiledField, CompiledObject, InputObjectType,
    ObjectType, Schema, TypeDeclarations, TypeDefinition, BUILTIN_SCALARS,
};
use crate::visitor::{inherit, Attached, DirectiveRegistry, DirectiveVisitor, InheritanceMode};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Scalar,
    Enum,
    Object,
    InputObject,
}

impl Kind {
    fn is_input(self) -> bool {
        !matches!(self, Kind::Object)
    }

    fn is_output(self) -> bool {
        !matches!(self, Kind::InputObject)
    }
}

pub struct SchemaBuilder {
    declarations: TypeDeclarations,
    resolvers: ResolverMap,
    visitors: Vec<Arc<dyn DirectiveVisitor>>,
    inheritance: InheritanceMode,
}

impl SchemaBuilder {
    pub fn new(declarations: TypeDeclarations) -> Self {
        Self {
            declarations,
            resolvers: ResolverMap::default(),
            visitors: Vec::new(),
            inheritance: InheritanceMode::default(),
        }
    }

    pub fn resolvers(mut self, resolvers: ResolverMap) -> Self {
        self.resolvers = resolvers;
        self
    }

    /// Register a directive implementation.
    pub fn directive(mut self, visitor: Arc<dyn DirectiveVisitor>) -> Self {
        self.visitors.push(visitor);
        self
    }

    pub fn inheritance(mut self, mode: InheritanceMode) -> Self {
        self.inheritance = mode;
        self
    }

    pub fn build(self) -> BastionResult<Schema> {
        let mut registry = DirectiveRegistry::default();
        for visitor in &self.visitors {
            registry.register(Arc::clone(visitor))?;
        }

        let kinds = self.collect_kinds(&registry)?;
        match kinds.get(&self.declarations.query_type) {
            Some(Kind::Object) => {}
            Some(_) => {
                return Err(BastionError::InvalidSchema {
                    reason: format!("query type '{}' is not an object type", self.declarations.query_type),
                })
            }
            None => {
                return Err(BastionError::UnknownType {
                    name: self.declarations.query_type.clone(),
                    element: "schema query root".to_string(),
                })
            }
        }

        let plans = Arc::new(self.compile_input_plans(&registry, &kinds)?);

        let mut objects = HashMap::new();
        let mut enforced_fields = 0usize;
        for definition in &self.declarations.types {
            if let TypeDefinition::Object(object) = definition {
                let compiled = self.compile_object(object, &registry, &kinds, &plans)?;
                enforced_fields += compiled.fields.iter().filter(|f| f.enforced).count();
                objects.insert(object.name.clone(), compiled);
            }
        }

        for (type_name, field) in self.resolvers.entries() {
            let declared = objects
                .get(type_name)
                .is_some_and(|object: &CompiledObject| object.field(field).is_some());
            if !declared {
                return Err(BastionError::UnknownField {
                    type_name: type_name.to_string(),
                    field: field.to_string(),
                });
            }
        }

        let directives = registry.declarations();
        info!(
            objects = objects.len(),
            enforced_fields,
            walked_input_types = plans.len(),
            directives = directives.len(),
            inheritance = ?self.inheritance,
            "schema built"
        );

        Ok(Schema {
            query_type: self.declarations.query_type,
            objects,
            directives,
        })
    }

    fn collect_kinds(&self, registry: &DirectiveRegistry) -> BastionResult<HashMap<String, Kind>> {
        let mut kinds: HashMap<String, Kind> = BUILTIN_SCALARS
            .iter()
            .map(|name| (name.to_string(), Kind::Scalar))
            .collect();

        let introduced: HashMap<String, _> = registry
            .declarations()
            .into_iter()
            .flat_map(|d| d.introduced_enums)
            .map(|e| (e.name.clone(), e))
            .collect();

        let mut declared = HashSet::new();
        for definition in &self.declarations.types {
            let name = definition.name();
            if !declared.insert(name.to_string()) || BUILTIN_SCALARS.contains(&name) {
                return Err(BastionError::InvalidSchema {
                    reason: format!("type '{name}' is declared more than once"),
                });
            }
            if let Some(enumeration) = introduced.get(name) {
                let same = matches!(definition, TypeDefinition::Enum(e) if e == enumeration);
                if !same {
                    return Err(BastionError::InvalidSchema {
                        reason: format!("type '{name}' clashes with an enum introduced by a directive"),
                    });
                }
            }
            let kind = match definition {
                TypeDefinition::Object(_) => Kind::Object,
                TypeDefinition::InputObject(_) => Kind::InputObject,
                TypeDefinition::Enum(_) => Kind::Enum,
                TypeDefinition::Scalar(_) => Kind::Scalar,
            };
            kinds.insert(name.to_string(), kind);
        }

        for name in introduced.into_keys() {
            kinds.entry(name).or_insert(Kind::Enum);
        }
        Ok(kinds)
    }

    fn compile_input_plans(
        &self,
        registry: &DirectiveRegistry,
        kinds: &HashMap<String, Kind>,
    ) -> BastionResult<InputPlans> {
        let mut objects = HashMap::new();
        for definition in &self.declarations.types {
            let TypeDefinition::InputObject(input) = definition else {
                continue;
            };
            objects.insert(input.name.clone(), self.compile_input_object(input, registry, kinds)?);
        }
        Ok(InputPlans::new(objects))
    }

    fn compile_input_object(
        &self,
        input: &InputObjectType,
        registry: &DirectiveRegistry,
        kinds: &HashMap<String, Kind>,
    ) -> BastionResult<Vec<InputValuePlan>> {
        let type_level = registry.compile(
            &input.directives,
            Location::InputObject,
            &format!("input {}", input.name),
        )?;

        let mut plans = Vec::with_capacity(input.fields.len());
        for field in &input.fields {
            let element = format!("input field {}.{}", input.name, field.name);
            let ty = input_type(&field.ty, kinds, &element)?;
            let own = registry.compile(&field.directives, Location::InputFieldDefinition, &element)?;
            plans.push(InputValuePlan {
                name: field.name.clone(),
                ty,
                rules: rules_of(inherit(&type_level, &own, self.inheritance)),
            });
        }
        Ok(plans)
    }

    fn compile_object(
        &self,
        object: &ObjectType,
        registry: &DirectiveRegistry,
        kinds: &HashMap<String, Kind>,
        plans: &Arc<InputPlans>,
    ) -> BastionResult<CompiledObject> {
        let type_level = registry.compile(&object.directives, Location::Object, &format!("type {}", object.name))?;

        let mut fields = Vec::with_capacity(object.fields.len());
        for field in &object.fields {
            let element = format!("field {}.{}", object.name, field.name);
            let ty = parse_type(&field.ty)?;
            match kinds.get(underlying_type(&ty)) {
                Some(kind) if kind.is_output() => {}
                Some(_) => {
                    return Err(BastionError::InvalidSchema {
                        reason: format!("{element} returns input type '{}'", underlying_type(&ty)),
                    })
                }
                None => {
                    return Err(BastionError::UnknownType {
                        name: underlying_type(&ty).to_string(),
                        element,
                    })
                }
            }

            let own = registry.compile(&field.directives, Location::FieldDefinition, &element)?;
            let steps = inherit(&type_level, &own, self.inheritance);

            let mut arguments = Vec::with_capacity(field.arguments.len());
            let mut argument_plans = Vec::with_capacity(field.arguments.len());
            for argument in &field.arguments {
                let argument_element = format!("argument {}.{}({})", object.name, field.name, argument.name);
                let arg_ty = input_type(&argument.ty, kinds, &argument_element)?;
                let attached = registry.compile(&argument.directives, Location::ArgumentDefinition, &argument_element)?;
                argument_plans.push(InputValuePlan {
                    name: argument.name.clone(),
                    ty: arg_ty.clone(),
                    rules: rules_of(attached),
                });
                arguments.push(CompiledArgument {
                    name: argument.name.clone(),
                    ty: arg_ty,
                    default: argument.default.clone(),
                });
            }
            let enforcer = ArgumentEnforcer::new(argument_plans, Arc::clone(plans));

            let host: Arc<dyn Resolver> = self
                .resolvers
                .get(&object.name, &field.name)
                .unwrap_or_else(|| Arc::new(PropertyResolver));

            let enforced = !steps.is_empty() || enforcer.is_some();
            let resolver: Arc<dyn Resolver> = if enforced {
                debug!(
                    field = %element,
                    steps = steps.len(),
                    checks_arguments = enforcer.is_some(),
                    "enforcement attached"
                );
                Arc::new(EnforcedResolver::new(&object.name, &field.name, steps, enforcer, host))
            } else {
                host
            };

            fields.push(CompiledField {
                name: field.name.clone(),
                ty,
                arguments,
                resolver,
                enforced,
            });
        }

        Ok(CompiledObject {
            name: object.name.clone(),
            fields,
        })
    }
}

fn input_type(raw: &str, kinds: &HashMap<String, Kind>, element: &str) -> BastionResult<Type> {
    let ty = parse_type(raw)?;
    match kinds.get(underlying_type(&ty)) {
        Some(kind) if kind.is_input() => Ok(ty),
        Some(_) => Err(BastionError::InvalidSchema {
            reason: format!("{element} takes output type '{}'", underlying_type(&ty)),
        }),
        None => Err(BastionError::UnknownType {
            name: underlying_type(&ty).to_string(),
            element: element.to_string(),
        }),
    }
}

fn rules_of(attached: Vec<Attached>) -> Vec<Arc<dyn crate::visitor::Rule>> {
    attached.iter().filter_map(|a| a.rule().cloned()).collect()
}
