use crate::error::DriverError;
use classgen::jvm::code::{BranchInstruction, Instruction, InvokeType, OrdComparison};
use classgen::jvm::model::{Class, CodeBuilder, FieldRef, Method, MethodRef};
use classgen::jvm::*;
use std::collections::HashMap;

/// Statement of the toy input language
///
/// Every variable holds an `int`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Statement {
    Declare(String),

    /// Read an integer from standard input
    Read(String),

    /// Print the variable on its own line
    Print(String),

    /// Run the body if the variable is not zero
    If(String, Vec<Statement>),
}

/// Program which declares, reads and echoes back a number if it is non-zero
pub fn sample_program() -> Vec<Statement> {
    use Statement::*;
    vec![
        Declare(String::from("x")),
        Declare(String::from("y")),
        Read(String::from("x")),
        If(
            String::from("x"),
            vec![Print(String::from("x")), Read(String::from("y")), Print(String::from("y"))],
        ),
    ]
}

const SCANNER: &str = "java/util/Scanner";
const OBJECT: &str = "java/lang/Object";

fn object(name: &str) -> FieldType {
    FieldType::Ref(RefType::Object(String::from(name)))
}

/// Public no-argument constructor which only calls `super()`
pub fn default_constructor(super_class: &str) -> Method {
    let mut code = CodeBuilder::new();
    code.push_instruction(Instruction::ALoad(0));
    code.invoke(
        InvokeType::Special,
        MethodRef::new(super_class, "<init>", MethodDescriptor::new(vec![], None)),
    );
    code.push_branch(BranchInstruction::Return);
    Method::new("<init>", MethodDescriptor::new(vec![], None), MethodAccessFlags::PUBLIC)
        .with_body(code.finish())
}

/// Class with nothing but a default constructor
pub fn companion_class(name: &str) -> Class {
    let mut class = Class::new(name, OBJECT, ClassAccessFlags::PUBLIC | ClassAccessFlags::SUPER);
    class.add_method(default_constructor(OBJECT));
    class
}

/// Lower a program into a class whose `main` method runs it
///
/// Local 0 is `args`, local 1 holds the `Scanner` over `System.in`, and variables get the
/// following locals in declaration order. Declared variables start out as `0`.
pub fn lower_program(class_name: &str, statements: &[Statement]) -> Result<Class, DriverError> {
    let mut lowering = Lowering {
        code: CodeBuilder::new(),
        variables: HashMap::new(),
        next_local: 2,
    };

    // Scanner scanner = new Scanner(System.in);
    let scanner = RefType::Object(String::from(SCANNER));
    lowering.code.push_instruction(Instruction::New(scanner));
    lowering.code.push_instruction(Instruction::Dup);
    lowering.code.get_static(FieldRef::new(
        "java/lang/System",
        "in",
        object("java/io/InputStream"),
    ));
    lowering.code.invoke(
        InvokeType::Special,
        MethodRef::new(
            SCANNER,
            "<init>",
            MethodDescriptor::new(vec![object("java/io/InputStream")], None),
        ),
    );
    lowering.code.push_instruction(Instruction::AStore(1));

    lowering.lower_statements(statements)?;
    lowering.code.push_branch(BranchInstruction::Return);

    let string_array = FieldType::Ref(RefType::Array(Box::new(object("java/lang/String"))));
    let main = Method::new(
        "main",
        MethodDescriptor::new(vec![string_array], None),
        MethodAccessFlags::PUBLIC | MethodAccessFlags::STATIC,
    )
    .with_body(lowering.code.finish());

    let mut class = companion_class(class_name);
    class.add_method(main);
    Ok(class)
}

struct Lowering {
    code: CodeBuilder,
    variables: HashMap<String, u16>,
    next_local: u16,
}

impl Lowering {
    fn local(&self, name: &str) -> Result<u16, DriverError> {
        self.variables
            .get(name)
            .copied()
            .ok_or_else(|| DriverError::UndeclaredVariable(name.to_owned()))
    }

    fn lower_statements(&mut self, statements: &[Statement]) -> Result<(), DriverError> {
        for statement in statements {
            self.lower_statement(statement)?;
        }
        Ok(())
    }

    fn lower_statement(&mut self, statement: &Statement) -> Result<(), DriverError> {
        match statement {
            Statement::Declare(name) => {
                let local = match self.variables.get(name) {
                    Some(local) => *local,
                    None => {
                        let local = self.next_local;
                        self.variables.insert(name.clone(), local);
                        self.next_local += 1;
                        local
                    }
                };
                self.code.push_instruction(Instruction::IConst0);
                self.code.push_instruction(Instruction::IStore(local));
            }
            Statement::Read(name) => {
                let local = self.local(name)?;
                self.code.push_instruction(Instruction::ALoad(1));
                self.code.invoke(
                    InvokeType::Virtual,
                    MethodRef::new(
                        SCANNER,
                        "nextInt",
                        MethodDescriptor::new(vec![], Some(FieldType::Base(BaseType::Int))),
                    ),
                );
                self.code.push_instruction(Instruction::IStore(local));
            }
            Statement::Print(name) => {
                let local = self.local(name)?;
                self.code.get_static(FieldRef::new(
                    "java/lang/System",
                    "out",
                    object("java/io/PrintStream"),
                ));
                self.code.push_instruction(Instruction::ILoad(local));
                self.code.invoke(
                    InvokeType::Virtual,
                    MethodRef::new(
                        "java/io/PrintStream",
                        "println",
                        MethodDescriptor::new(vec![FieldType::Base(BaseType::Int)], None),
                    ),
                );
            }
            Statement::If(name, body) => {
                let local = self.local(name)?;
                let otherwise = self.code.fresh_label();
                let end = self.code.fresh_label();
                self.code.push_instruction(Instruction::ILoad(local));
                self.code
                    .push_branch(BranchInstruction::If(OrdComparison::EQ, otherwise));
                self.lower_statements(body)?;
                self.code.push_branch(BranchInstruction::Goto(end));
                self.code.place_label(otherwise);
                self.code.place_label(end);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use classgen::{compile_class, CompileOptions};

    #[test]
    fn sample_program_compiles() {
        let class = lower_program("Main", &sample_program()).unwrap();
        assert_eq!(class.methods.len(), 2);
        let compiled = compile_class(&class, &CompileOptions::default()).unwrap();
        assert_eq!(&compiled.bytes[0..4], &[0xca, 0xfe, 0xba, 0xbe]);
    }

    #[test]
    fn undeclared_variables_are_reported() {
        let program = vec![Statement::Print(String::from("z"))];
        match lower_program("Main", &program) {
            Err(err @ DriverError::UndeclaredVariable(_)) => {
                assert_eq!(err.to_string(), "Variable z not declared");
            }
            other => panic!("expected an undeclared variable, got {:?}", other),
        }
    }

    #[test]
    fn nested_ifs_compile() {
        use Statement::*;
        let program = vec![
            Declare(String::from("a")),
            Read(String::from("a")),
            If(
                String::from("a"),
                vec![If(String::from("a"), vec![Print(String::from("a"))])],
            ),
            Print(String::from("a")),
        ];
        let class = lower_program("Nested", &program).unwrap();
        assert!(compile_class(&class, &CompileOptions::default()).is_ok());
    }
}
