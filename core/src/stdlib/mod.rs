//! The standard native-function bundle. A thin consumer of the FFI: every
//! function here has the plain native signature and reports failure by
//! returning the error branch, which the VM rethrows into the script.


use std::io::Write;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::values::value::string_text;
use crate::values::{Outcome, Value};
use crate::vm::Vm;

/// Declare the whole bundle as globals. Call before running scripts that
/// expect a standard library.
pub fn install(vm: &mut Vm) -> Outcome {
    vm.declare_variable("print", Value::Native(print))?;
    vm.declare_variable("println", Value::Native(println))?;
    vm.declare_variable("length", Value::Native(length))?;
    vm.declare_variable("push", Value::Native(push))?;
    vm.declare_variable("pop", Value::Native(pop))?;
    vm.declare_variable("keys", Value::Native(keys))?;
    vm.declare_variable("values", Value::Native(values))?;
    vm.declare_variable("tostring", Value::Native(tostring))?;
    vm.declare_variable("tonumber", Value::Native(tonumber))?;
    vm.declare_variable("floor", Value::Native(floor))?;
    vm.declare_variable("ceil", Value::Native(ceil))?;
    vm.declare_variable("round", Value::Native(round))?;
    vm.declare_variable("trunc", Value::Native(trunc))?;
    vm.declare_variable("filter", Value::Native(filter))?;
    vm.declare_variable("clock", Value::Native(clock))?;
    vm.declare_variable("gc", Value::Native(collect))?;
    vm.declare_variable("dump", Value::Native(dump))?;
    Ok(Value::Null)
}

fn write_joined(vm: &Vm, arguments: &[Value]) -> String {
    let mut out = String::new();
    for (i, value) in arguments.iter().enumerate() {
        if i > 0 {
            out.push(' ');
        }
        out.push_str(&vm.display_value(*value));
    }
    out
}

fn print(vm: &mut Vm, arguments: &[Value]) -> Outcome {
    let text = write_joined(vm, arguments);
    let mut stdout = std::io::stdout();
    let _ = stdout.write_all(text.as_bytes());
    let _ = stdout.flush();
    Ok(Value::Null)
}

fn println(vm: &mut Vm, arguments: &[Value]) -> Outcome {
    let mut text = write_joined(vm, arguments);
    text.push('\n');
    let _ = std::io::stdout().write_all(text.as_bytes());
    Ok(Value::Null)
}

fn length(vm: &mut Vm, arguments: &[Value]) -> Outcome {
    let [value] = arguments else {
        return Err(Value::Scripture("length takes exactly one argument"));
    };
    let count = if let Some(text) = string_text(*value, vm.heap(), vm.program()) {
        text.len()
    } else {
        match value {
            Value::Array(gc) => vm.heap().array(*gc).len(),
            Value::Object(gc) => vm.heap().object(*gc).len(),
            _ => return Err(Value::Scripture("length operand must be string, array or object")),
        }
    };
    Ok(Value::Number(count as f64))
}

fn push(vm: &mut Vm, arguments: &[Value]) -> Outcome {
    let Some((&Value::Array(gc), elements)) = arguments.split_first() else {
        return Err(Value::Scripture("push needs an array and elements"));
    };
    for element in elements {
        vm.heap_mut().array_push(gc, *element);
    }
    Ok(Value::Null)
}

fn pop(vm: &mut Vm, arguments: &[Value]) -> Outcome {
    let [Value::Array(gc)] = arguments else {
        return Err(Value::Scripture("pop needs an array"));
    };
    match vm.heap_mut().array_mut(*gc).pop() {
        Some(Value::Undefined) | None => Ok(Value::Null),
        Some(value) => Ok(value),
    }
}

fn keys(vm: &mut Vm, arguments: &[Value]) -> Outcome {
    let [Value::Object(gc)] = arguments else {
        return Err(Value::Scripture("keys needs an object"));
    };
    let names: Vec<String> = vm
        .heap()
        .object(*gc)
        .iter()
        .map(|(key, _)| key.to_owned())
        .collect();
    let array = vm.heap_mut().alloc_array();
    let array_gc = array.as_gc().expect("fresh array");
    for name in names {
        let key = vm.heap_mut().alloc_string(name);
        vm.heap_mut().array_push(array_gc, key);
    }
    Ok(array)
}

fn values(vm: &mut Vm, arguments: &[Value]) -> Outcome {
    let [Value::Object(gc)] = arguments else {
        return Err(Value::Scripture("values needs an object"));
    };
    let members: Vec<Value> = vm.heap().object(*gc).iter().map(|(_, v)| v).collect();
    let array = vm.heap_mut().alloc_array();
    let array_gc = array.as_gc().expect("fresh array");
    for member in members {
        vm.heap_mut().array_push(array_gc, member);
    }
    Ok(array)
}

fn tostring(vm: &mut Vm, arguments: &[Value]) -> Outcome {
    let [value] = arguments else {
        return Err(Value::Scripture("tostring takes exactly one argument"));
    };
    let text = vm.display_value(*value);
    Ok(vm.heap_mut().alloc_string(text))
}

fn tonumber(vm: &mut Vm, arguments: &[Value]) -> Outcome {
    let [value] = arguments else {
        return Err(Value::Scripture("tonumber takes exactly one argument"));
    };
    if let Value::Number(_) = value {
        return Ok(*value);
    }
    let Some(text) = string_text(*value, vm.heap(), vm.program()) else {
        return Err(Value::Scripture("tonumber operand must be number or string"));
    };
    match text.trim().parse::<f64>() {
        Ok(number) => Ok(Value::Number(number)),
        Err(_) => Err(Value::Scripture("Cannot convert to number")),
    }
}

fn numeric(arguments: &[Value]) -> Result<f64, Value> {
    match arguments {
        [Value::Number(n)] => Ok(*n),
        _ => Err(Value::Scripture("Arithmatic operand must be number")),
    }
}

fn floor(_vm: &mut Vm, arguments: &[Value]) -> Outcome {
    Ok(Value::Number(numeric(arguments)?.floor()))
}

fn ceil(_vm: &mut Vm, arguments: &[Value]) -> Outcome {
    Ok(Value::Number(numeric(arguments)?.ceil()))
}

fn round(_vm: &mut Vm, arguments: &[Value]) -> Outcome {
    Ok(Value::Number(numeric(arguments)?.round()))
}

fn trunc(_vm: &mut Vm, arguments: &[Value]) -> Outcome {
    Ok(Value::Number(numeric(arguments)?.trunc()))
}

/// Keep the elements for which the callback returns `true`. Calls back into
/// the VM, so a throwing callback propagates as this function's error.
fn filter(vm: &mut Vm, arguments: &[Value]) -> Outcome {
    let [Value::Array(source), callback] = arguments else {
        return Err(Value::Scripture("filter needs an array and a function"));
    };
    let elements = vm.heap().array(*source).clone();
    let mut kept = Vec::new();
    for element in elements {
        let element = if element == Value::Undefined {
            Value::Null
        } else {
            element
        };
        let verdict = vm.call(*callback, &[element])?;
        let Value::Boolean(keep) = verdict else {
            return Err(Value::Scripture("Filter function must return boolean"));
        };
        if keep {
            kept.push(element);
        }
    }
    let array = vm.heap_mut().alloc_array();
    let array_gc = array.as_gc().expect("fresh array");
    for element in kept {
        vm.heap_mut().array_push(array_gc, element);
    }
    Ok(array)
}

fn clock(_vm: &mut Vm, _arguments: &[Value]) -> Outcome {
    let elapsed = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|_| Value::Scripture("Clock went backwards"))?;
    Ok(Value::Number(elapsed.as_secs_f64()))
}

fn collect(vm: &mut Vm, _arguments: &[Value]) -> Outcome {
    vm.gc();
    Ok(Value::Null)
}

fn dump(vm: &mut Vm, _arguments: &[Value]) -> Outcome {
    let state = vm.dump_state();
    let _ = std::io::stdout().write_all(state.as_bytes());
    Ok(Value::Null)
}
