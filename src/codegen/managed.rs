//! Managed wrapper generator: one C# file with P/Invoke declarations for
//! every shim, the support types they need, and idiomatic wrappers on top.
//!
//! User types are always written fully qualified (`global::Ns.Type`) since a
//! property or a variant record may share a name with another exported type.
use crate::abi::{self, AbiType, Direction, Shim, Symbols};
use crate::codegen::writer::SourceWriter;
use crate::config::GeneratorConfig;
use crate::ir::{
    ExportedEnum, ExportedFunction, ExportedStruct, FieldName, ParamMode, PrimitiveKind, Receiver,
    Schema, TypeRef,
};
use crate::naming;

const SUPPORT: &str = r#"[StructLayout(LayoutKind.Sequential)]
internal struct RustBuffer
{
    public IntPtr Data;
    public UIntPtr Len;
    public UIntPtr Capacity;

    internal byte[] ToArray()
    {
        var len = checked((int)Len.ToUInt64());
        var bytes = new byte[len];
        if (len > 0)
        {
            Marshal.Copy(Data, bytes, 0, len);
        }
        return bytes;
    }
}

[StructLayout(LayoutKind.Sequential)]
internal struct FfiStr
{
    public IntPtr Data;
    public UIntPtr Len;
}

[StructLayout(LayoutKind.Sequential)]
internal struct CallStatus
{
    public sbyte Code;
    public RustBuffer ErrorBuf;
}

/// <summary>A managed string copied to unmanaged UTF-8 for the duration of one call.</summary>
internal sealed class Utf8Arg : IDisposable
{
    private IntPtr _data;
    private readonly int _len;

    internal Utf8Arg(string value)
    {
        _data = Marshal.StringToCoTaskMemUTF8(value);
        _len = Encoding.UTF8.GetByteCount(value);
    }

    internal FfiStr View => new FfiStr { Data = _data, Len = (UIntPtr)(uint)_len };

    public void Dispose()
    {
        var data = Interlocked.Exchange(ref _data, IntPtr.Zero);
        if (data != IntPtr.Zero)
        {
            Marshal.FreeCoTaskMem(data);
        }
    }
}

/// <summary>A native handle released exactly once, by whoever gets there first.</summary>
internal sealed class OwnedHandle : IDisposable
{
    private ulong _value;
    private readonly Action<ulong> _free;
    private readonly string _owner;

    internal OwnedHandle(ulong value, Action<ulong> free, string owner)
    {
        _value = value;
        _free = free;
        _owner = owner;
    }

    internal ulong Value
    {
        get
        {
            var value = Interlocked.Read(ref _value);
            if (value == 0)
            {
                throw new ObjectDisposedException(_owner);
            }
            return value;
        }
    }

    /// <summary>Drop the handle without freeing it; native code now owns the value.</summary>
    internal void Forget() => Interlocked.Exchange(ref _value, 0UL);

    public void Dispose()
    {
        var value = Interlocked.Exchange(ref _value, 0UL);
        if (value != 0)
        {
            _free(value);
        }
    }
}

internal sealed class ByteReader
{
    private readonly byte[] _bytes;
    private int _pos;

    internal ByteReader(byte[] bytes)
    {
        _bytes = bytes;
    }

    private ReadOnlySpan<byte> Take(int count)
    {
        if (count < 0 || _bytes.Length - _pos < count)
        {
            throw new NativeContractException($"native payload truncated: needed {count} bytes, {_bytes.Length - _pos} left");
        }
        var span = new ReadOnlySpan<byte>(_bytes, _pos, count);
        _pos += count;
        return span;
    }

    internal bool ReadBool() => Take(1)[0] switch
    {
        0 => false,
        1 => true,
        var other => throw new NativeContractException($"invalid bool byte {other}"),
    };

    internal bool ReadPresence() => Take(1)[0] switch
    {
        0 => false,
        1 => true,
        var other => throw new NativeContractException($"invalid presence tag {other}"),
    };

    internal byte ReadU8() => Take(1)[0];
    internal sbyte ReadI8() => unchecked((sbyte)Take(1)[0]);
    internal ushort ReadU16() => BinaryPrimitives.ReadUInt16LittleEndian(Take(2));
    internal short ReadI16() => BinaryPrimitives.ReadInt16LittleEndian(Take(2));
    internal uint ReadU32() => BinaryPrimitives.ReadUInt32LittleEndian(Take(4));
    internal int ReadI32() => BinaryPrimitives.ReadInt32LittleEndian(Take(4));
    internal ulong ReadU64() => BinaryPrimitives.ReadUInt64LittleEndian(Take(8));
    internal long ReadI64() => BinaryPrimitives.ReadInt64LittleEndian(Take(8));
    internal float ReadF32() => BinaryPrimitives.ReadSingleLittleEndian(Take(4));
    internal double ReadF64() => BinaryPrimitives.ReadDoubleLittleEndian(Take(8));
    internal ulong ReadHandle() => ReadU64();

    internal string ReadString()
    {
        var len = checked((int)ReadU32());
        return Encoding.UTF8.GetString(Take(len));
    }
}

/// <summary>Base of every failure raised by a native call.</summary>
public abstract class NativeException : Exception
{
    protected NativeException(string message) : base(message)
    {
    }

    /// <summary>Always true: the failure originated on the native side.</summary>
    public bool IsFromNative => true;
}

/// <summary>Native code panicked; the panic was trapped at the boundary.</summary>
public sealed class NativePanicException : NativeException
{
    internal NativePanicException(string message) : base(message)
    {
    }
}

/// <summary>The call broke the boundary contract (stale handle, invalid UTF-8, wrong variant).</summary>
public sealed class NativeContractException : NativeException
{
    internal NativeContractException(string message) : base(message)
    {
    }
}

/// <summary>The native function returned an error.</summary>
public class NativeErrorException : NativeException
{
    internal NativeErrorException(string message) : base(message)
    {
    }
}

/// <summary>The native function returned an error value of type <typeparamref name="TError"/>.</summary>
public sealed class NativeErrorException<TError> : NativeErrorException
{
    internal NativeErrorException(TError error) : base($"native call failed: {error}")
    {
        Error = error;
    }

    public TError Error { get; }
}

internal static class Ffi
{
    internal const sbyte Success = 0;
    internal const sbyte Error = 1;
    internal const sbyte Panic = 2;
    internal const sbyte Contract = 3;

    internal static void Check(ref CallStatus status)
    {
        var code = status.Code;
        if (code == Success)
        {
            return;
        }
        var message = Encoding.UTF8.GetString(TakeErrorBuf(ref status));
        switch (code)
        {
            case Error:
                throw new NativeErrorException("native call failed");
            case Panic:
                throw new NativePanicException(message);
            case Contract:
                throw new NativeContractException(message);
            default:
                throw new NativeContractException($"unknown call status {code}");
        }
    }

    internal static void Check<TError>(ref CallStatus status, Func<ByteReader, TError> readError)
    {
        if (status.Code == Error)
        {
            var reader = new ByteReader(TakeErrorBuf(ref status));
            throw new NativeErrorException<TError>(readError(reader));
        }
        Check(ref status);
    }

    internal static byte[] TakeErrorBuf(ref CallStatus status)
    {
        var buffer = status.ErrorBuf;
        status.ErrorBuf = default;
        return Consume(buffer);
    }

    /// <summary>Copy a native buffer out and release it.</summary>
    internal static byte[] Consume(RustBuffer buffer)
    {
        if (buffer.Data == IntPtr.Zero)
        {
            return Array.Empty<byte>();
        }
        try
        {
            return buffer.ToArray();
        }
        finally
        {
            var status = default(CallStatus);
            NativeMethods.$BUFFER_FREE$(buffer, ref status);
        }
    }

    internal static string LiftString(RustBuffer buffer) => Encoding.UTF8.GetString(Consume(buffer));
}"#;

const THREADING_REMARKS: &str = "/// <remarks>Not synchronized: confine each instance to one thread at a time or guard it externally.</remarks>";

// ————————————————————————————————————————————————————————————————————————————
// TYPES
// ————————————————————————————————————————————————————————————————————————————

pub struct ManagedCodegen<'a> {
    schema: &'a Schema,
    config: &'a GeneratorConfig,
    prefix: String,
    namespace: String,
    shims: Vec<Shim>,
    w: SourceWriter,
}

/// One argument lowered to its flat form.
struct Lowered {
    setup: Vec<String>,
    arg: String,
    keep_alive: Option<String>,
}

impl Lowered {
    fn plain(arg: String) -> Self {
        Self { setup: Vec::new(), arg, keep_alive: None }
    }
}

/// Everything needed to emit one shim call with its checks and result.
struct Invocation<'x> {
    symbol: String,
    args: Vec<Lowered>,
    forget: Vec<String>,
    returns: &'x TypeRef,
}

// ————————————————————————————————————————————————————————————————————————————
// IMPLEMENTATION
// ————————————————————————————————————————————————————————————————————————————

impl<'a> ManagedCodegen<'a> {
    pub fn new(schema: &'a Schema, config: &'a GeneratorConfig) -> Self {
        let prefix = config.symbol_prefix();
        let shims = abi::shims(schema, &prefix);
        Self {
            schema,
            config,
            namespace: config.namespace(),
            prefix,
            shims,
            w: SourceWriter::new("    "),
        }
    }

    pub fn emit(&mut self) {
        self.emit_header();
        self.emit_support();
        self.emit_native_methods();
        let schema = self.schema;
        for def in schema.structs.values() {
            self.w.blank();
            self.emit_struct(def);
        }
        for def in schema.enums.values() {
            self.w.blank();
            self.emit_enum(def);
        }
        self.w.blank();
        self.emit_facade();
    }

    pub fn into_string(self) -> String {
        self.w.into_string()
    }

    fn emit_header(&mut self) {
        self.w.line("// <auto-generated>");
        self.w.line(format!(
            "// Generated by crossbind for native library `{}`. Do not edit.",
            self.config.library_name
        ));
        self.w.line("// </auto-generated>");
        self.w.line("#nullable enable");
        self.w.blank();
        for using in [
            "System",
            "System.Buffers.Binary",
            "System.Runtime.InteropServices",
            "System.Text",
            "System.Threading",
        ] {
            self.w.line(format!("using {using};"));
        }
        self.w.blank();
        self.w.line(format!("namespace {};", self.namespace));
        self.w.blank();
    }

    fn emit_support(&mut self) {
        let buffer_free = Symbols::new(&self.prefix).buffer_free();
        self.w.lines(SUPPORT.replace("$BUFFER_FREE$", &naming::csharp_ident(&buffer_free)));
        for ty in abi::option_types(&self.shims) {
            let AbiType::Option(inner) = &ty else { continue };
            self.w.blank();
            self.w.line("[StructLayout(LayoutKind.Sequential)]");
            self.w.line(format!("internal struct {}", ty.csharp_type()));
            self.w.open("{");
            self.w.line("public byte Present;");
            self.w.line(format!("public {} Value;", inner.csharp_type()));
            self.w.close("}");
        }
    }

    fn emit_native_methods(&mut self) {
        self.w.blank();
        self.w.line("internal static class NativeMethods");
        self.w.open("{");
        self.w.line(format!("private const string Library = {:?};", self.config.library_name));
        for shim in std::mem::take(&mut self.shims) {
            let mut params: Vec<String> = shim
                .params
                .iter()
                .map(|p| format!("{} {}", p.ty.csharp_type(), native_param(&p.name)))
                .collect();
            params.push("ref CallStatus __status".to_string());
            self.w.blank();
            self.w.line(format!(
                "[DllImport(Library, EntryPoint = {:?}, CallingConvention = CallingConvention.Cdecl)]",
                shim.symbol
            ));
            self.w.line(format!(
                "internal static extern {} {}({});",
                shim.ret.csharp_type(),
                naming::csharp_ident(&shim.symbol),
                params.join(", ")
            ));
        }
        self.w.close("}");
    }

    // ———— structs ————

    fn emit_struct(&mut self, def: &ExportedStruct) {
        let class = naming::to_pascal_case(&def.name);
        let prefix = self.prefix.clone();
        let symbols = Symbols::new(&prefix);
        self.w.line(format!("/// <summary>Managed wrapper for native <c>{}</c>.</summary>", def.name));
        self.w.line(THREADING_REMARKS);
        self.w.line(format!("public sealed class {class} : IDisposable"));
        self.w.open("{");
        self.w.line("private readonly OwnedHandle _handle;");

        // public constructor
        self.w.blank();
        let params: Vec<String> = def
            .fields
            .iter()
            .map(|f| format!("{} {}", self.managed_type(&f.ty), managed_param(&f.name)))
            .collect();
        self.w.line(format!("public {class}({})", params.join(", ")));
        self.w.open("{");
        let args = def
            .fields
            .iter()
            .map(|f| self.lower_arg(&managed_param(&f.name), &local(&f.name), &f.ty))
            .collect();
        let handle_ty = TypeRef::Primitive(PrimitiveKind::U64);
        self.emit_invocation(
            Invocation { symbol: symbols.ctor(&def.name), args, forget: Vec::new(), returns: &handle_ty },
            false,
        );
        self.w.line(format!("_handle = new OwnedHandle(__ret, Free, nameof({class}));"));
        self.w.close("}");

        self.w.blank();
        self.w.line(format!("private {class}(OwnedHandle handle)"));
        self.w.open("{");
        self.w.line("_handle = handle;");
        self.w.close("}");
        self.w.blank();
        self.w.line(format!(
            "internal static {class} FromHandle(ulong handle) => new {class}(new OwnedHandle(handle, Free, nameof({class})));"
        ));
        self.w.blank();
        self.w.line("internal ulong RawHandle => _handle.Value;");
        self.w.blank();
        self.w.line("internal void Forget()");
        self.w.open("{");
        self.w.line("_handle.Forget();");
        self.w.line("global::System.GC.SuppressFinalize(this);");
        self.w.close("}");

        for field in &def.fields {
            self.w.blank();
            self.emit_property(def, &field.name, &field.ty, &symbols);
        }

        let schema = self.schema;
        for method in schema.methods_of(def.id) {
            self.w.blank();
            self.emit_struct_method(method);
        }

        self.w.blank();
        self.w.line("public void Dispose()");
        self.w.open("{");
        self.w.line("_handle?.Dispose();");
        self.w.line("global::System.GC.SuppressFinalize(this);");
        self.w.close("}");
        self.w.blank();
        self.w.line(format!("~{class}()"));
        self.w.open("{");
        self.w.line("_handle?.Dispose();");
        self.w.close("}");
        self.w.blank();
        self.w.line("private static void Free(ulong handle)");
        self.w.open("{");
        self.w.line("var __status = default(CallStatus);");
        self.w.line(format!(
            "NativeMethods.{}(handle, ref __status);",
            naming::csharp_ident(&symbols.free(&def.name))
        ));
        self.w.close("}");
        self.w.close("}");
    }

    fn emit_property(&mut self, def: &ExportedStruct, field: &str, ty: &TypeRef, symbols: &Symbols<'_>) {
        if matches!(ty, TypeRef::Handle(_)) {
            self.w.line("/// <remarks>Each read returns a new wrapper owning a copy; dispose it when done.</remarks>");
        }
        self.w.line(format!("public {} {}", self.managed_type(ty), naming::to_pascal_case(field)));
        self.w.open("{");
        self.w.line("get");
        self.w.open("{");
        let receiver = Lowered {
            setup: Vec::new(),
            arg: "RawHandle".to_string(),
            keep_alive: Some("this".to_string()),
        };
        self.emit_invocation(
            Invocation {
                symbol: symbols.getter(&def.name, field),
                args: vec![receiver],
                forget: Vec::new(),
                returns: ty,
            },
            true,
        );
        self.w.close("}");
        self.w.close("}");
    }

    fn emit_struct_method(&mut self, method: &ExportedFunction) {
        self.emit_doc_for_method(method);
        let params = self.method_params(method);
        self.w.line(format!(
            "public {} {}({})",
            self.managed_type(&method.returns),
            naming::to_pascal_case(&method.name),
            params.join(", ")
        ));
        self.w.open("{");
        let mut args = vec![Lowered {
            setup: Vec::new(),
            arg: "RawHandle".to_string(),
            keep_alive: Some("this".to_string()),
        }];
        let mut forget = Vec::new();
        if let Receiver::ByValue(_) = method.receiver {
            forget.push("this".to_string());
        }
        self.lower_params(method, &mut args, &mut forget);
        let symbol = Symbols::new(&self.prefix).function(method, self.schema);
        self.emit_invocation(Invocation { symbol, args, forget, returns: &method.returns }, true);
        self.w.close("}");
    }

    // ———— enums ————

    fn emit_enum(&mut self, def: &ExportedEnum) {
        let class = naming::to_pascal_case(&def.name);
        let interface = self.qualified(&format!("I{class}"));
        let prefix = self.prefix.clone();
        let symbols = Symbols::new(&prefix);

        self.w.line(format!("/// <summary>A value of native enum <c>{}</c>.</summary>", def.name));
        self.w.line(format!("public interface I{class}"));
        self.w.line("{");
        self.w.line("}");
        self.w.blank();
        self.w.line(format!("/// <summary>Variants of native enum <c>{}</c>.</summary>", def.name));
        self.w.line(THREADING_REMARKS);
        self.w.line(format!("public static class {class}"));
        self.w.open("{");

        for variant in &def.variants {
            let fields: Vec<String> = variant
                .payload
                .fields()
                .iter()
                .map(|f| format!("{} {}", self.managed_type(f.ty), record_field(f.name)))
                .collect();
            self.w.line(format!(
                "public sealed record {}({}) : {interface};",
                naming::to_pascal_case(&variant.name),
                fields.join(", ")
            ));
        }

        // Decode
        self.w.blank();
        self.w.line(format!("internal static {interface} Decode(ulong handle)"));
        self.w.open("{");
        self.w.line("try");
        self.w.open("{");
        self.w.line("var __status = default(CallStatus);");
        self.w.line(format!(
            "var __tag = NativeMethods.{}(handle, ref __status);",
            naming::csharp_ident(&symbols.tag(&def.name))
        ));
        self.w.line("Ffi.Check(ref __status);");
        self.w.line("switch (__tag)");
        self.w.open("{");
        for variant in &def.variants {
            self.w.line(format!("case {}:", variant.discriminant));
            self.w.open("{");
            let fields = variant.payload.fields();
            let mut values = Vec::with_capacity(fields.len());
            for (i, field) in fields.iter().enumerate() {
                self.w.line("__status = default;");
                self.w.line(format!(
                    "var __r{i} = NativeMethods.{}(handle, ref __status);",
                    naming::csharp_ident(&symbols.variant_getter(&def.name, &variant.name, field.name))
                ));
                self.w.line("Ffi.Check(ref __status);");
                self.w.line(format!("var __f{i} = {};", self.lift(&format!("__r{i}"), field.ty)));
                values.push(format!("__f{i}"));
            }
            self.w.line(format!(
                "return new {}({});",
                naming::to_pascal_case(&variant.name),
                values.join(", ")
            ));
            self.w.close("}");
        }
        self.w.line("default:");
        self.w.line(format!(
            "    throw new NativeContractException($\"unknown {} discriminant {{__tag}}\");",
            def.name
        ));
        self.w.close("}");
        self.w.close("}");
        self.w.line("finally");
        self.w.open("{");
        self.w.line("Free(handle);");
        self.w.close("}");
        self.w.close("}");

        // Lower
        self.w.blank();
        self.w.line(format!("internal static ulong Lower({interface} value)"));
        self.w.open("{");
        self.w.line("var __status = default(CallStatus);");
        self.w.line("ulong __ret;");
        self.w.line("switch (value)");
        self.w.open("{");
        for variant in &def.variants {
            let record = naming::to_pascal_case(&variant.name);
            let fields = variant.payload.fields();
            let binding = if fields.is_empty() { String::new() } else { " __v".to_string() };
            self.w.line(format!("case {record}{binding}:"));
            self.w.open("{");
            let lowered: Vec<Lowered> = fields
                .iter()
                .map(|f| {
                    let source = format!("__v.{}", record_field(f.name));
                    self.lower_arg(&source, &local(&abi::payload_param_name(f.name)), f.ty)
                })
                .collect();
            let mut args = Vec::with_capacity(lowered.len());
            let mut keep_alive = Vec::new();
            for l in lowered {
                for line in &l.setup {
                    self.w.line(line);
                }
                args.push(l.arg);
                keep_alive.extend(l.keep_alive);
            }
            args.push("ref __status".to_string());
            self.w.line(format!(
                "__ret = NativeMethods.{}({});",
                naming::csharp_ident(&symbols.variant_ctor(&def.name, &variant.name)),
                args.join(", ")
            ));
            for alive in keep_alive {
                self.w.line(format!("global::System.GC.KeepAlive({alive});"));
            }
            self.w.line("break;");
            self.w.close("}");
        }
        self.w.line("default:");
        self.w.line(format!(
            "    throw new global::System.ArgumentException($\"unknown I{class} implementation {{value?.GetType()}}\", nameof(value));"
        ));
        self.w.close("}");
        self.w.line("Ffi.Check(ref __status);");
        self.w.line("return __ret;");
        self.w.close("}");

        // Free
        self.w.blank();
        self.w.line("internal static void Free(ulong handle)");
        self.w.open("{");
        self.w.line("var __status = default(CallStatus);");
        self.w.line(format!(
            "NativeMethods.{}(handle, ref __status);",
            naming::csharp_ident(&symbols.free(&def.name))
        ));
        self.w.close("}");

        let schema = self.schema;
        for method in schema.methods_of(def.id) {
            self.w.blank();
            self.emit_enum_method(def, &interface, method);
        }
        self.w.close("}");
    }

    fn emit_enum_method(&mut self, def: &ExportedEnum, interface: &str, method: &ExportedFunction) {
        self.emit_doc_for_method(method);
        let mut params = vec![format!("this {interface} __self")];
        params.extend(self.method_params(method));
        self.w.line(format!(
            "public static {} {}({})",
            self.managed_type(&method.returns),
            naming::to_pascal_case(&method.name),
            params.join(", ")
        ));
        self.w.open("{");
        let mut args = vec![self.lower_arg("__self", "__selfHandle", &TypeRef::Handle(def.id))];
        let mut forget = Vec::new();
        if let Receiver::ByValue(_) = method.receiver {
            forget.push("__selfHandle".to_string());
        }
        self.lower_params(method, &mut args, &mut forget);
        let symbol = Symbols::new(&self.prefix).function(method, self.schema);
        self.emit_invocation(Invocation { symbol, args, forget, returns: &method.returns }, true);
        self.w.close("}");
    }

    // ———— facade ————

    fn emit_facade(&mut self) {
        let facade = self.config.facade_class.clone();
        self.w.line(format!(
            "/// <summary>Free functions of native library <c>{}</c>.</summary>",
            self.config.library_name
        ));
        self.w.line(THREADING_REMARKS);
        self.w.line(format!("public static class {facade}"));
        self.w.open("{");
        let schema = self.schema;
        for (i, function) in schema.free_functions().enumerate() {
            if i > 0 {
                self.w.blank();
            }
            self.emit_doc_for_method(function);
            let params = self.method_params(function);
            self.w.line(format!(
                "public static {} {}({})",
                self.managed_type(&function.returns),
                naming::to_pascal_case(&function.name),
                params.join(", ")
            ));
            self.w.open("{");
            let mut args = Vec::new();
            let mut forget = Vec::new();
            self.lower_params(function, &mut args, &mut forget);
            let symbol = Symbols::new(&self.prefix).function(function, self.schema);
            self.emit_invocation(Invocation { symbol, args, forget, returns: &function.returns }, true);
            self.w.close("}");
        }
        self.w.close("}");
    }

    // ———— shared call plumbing ————

    fn emit_doc_for_method(&mut self, function: &ExportedFunction) {
        self.w.line(format!("/// <summary>Calls native <c>{}</c>.</summary>", function.name));
        for param in &function.params {
            if param.mode == ParamMode::Transfer {
                self.w.line(format!(
                    "/// <param name=\"{}\">Ownership moves to native code; the wrapper is unusable afterwards.</param>",
                    managed_param(&param.name).trim_start_matches('@')
                ));
            }
        }
        if let Some(err) = function.returns.error() {
            let exception = match err {
                TypeRef::Unit => "NativeErrorException".to_string(),
                other => format!("NativeErrorException{{{}}}", self.managed_type(other)),
            };
            self.w.line(format!(
                "/// <exception cref=\"{exception}\">The native function returned an error.</exception>"
            ));
        }
    }

    fn method_params(&self, function: &ExportedFunction) -> Vec<String> {
        function
            .params
            .iter()
            .map(|p| format!("{} {}", self.managed_type(&p.ty), managed_param(&p.name)))
            .collect()
    }

    fn lower_params(&self, function: &ExportedFunction, args: &mut Vec<Lowered>, forget: &mut Vec<String>) {
        for param in &function.params {
            let name = managed_param(&param.name);
            args.push(self.lower_arg(&name, &local(&param.name), &param.ty));
            if param.mode == ParamMode::Transfer {
                forget.push(name);
            }
        }
    }

    /// Emit one shim call with its status check. With `emit_return` unset the
    /// flat result stays bound to `__ret` for the caller to wrap.
    fn emit_invocation(&mut self, call: Invocation<'_>, emit_return: bool) {
        let mut args = Vec::with_capacity(call.args.len() + 1);
        let mut keep_alive = Vec::new();
        for lowered in call.args {
            for line in &lowered.setup {
                self.w.line(line);
            }
            args.push(lowered.arg);
            keep_alive.extend(lowered.keep_alive);
        }
        args.push("ref __status".to_string());
        self.w.line("var __status = default(CallStatus);");
        let flat = AbiType::of(call.returns, Direction::Out);
        let invoke = format!("NativeMethods.{}({})", naming::csharp_ident(&call.symbol), args.join(", "));
        if flat == AbiType::Void {
            self.w.line(format!("{invoke};"));
        } else {
            self.w.line(format!("var __ret = {invoke};"));
        }
        for alive in keep_alive {
            self.w.line(format!("global::System.GC.KeepAlive({alive});"));
        }
        for target in &call.forget {
            self.w.line(format!("if (__status.Code != Ffi.Contract) {target}.Forget();"));
        }
        match call.returns.error() {
            None | Some(TypeRef::Unit) => self.w.line("Ffi.Check(ref __status);"),
            Some(err) => {
                let read = self.read(err, "__reader");
                self.w.line(format!("Ffi.Check(ref __status, __reader => {read});"))
            }
        };
        if emit_return && flat != AbiType::Void {
            self.w.line(format!("return {};", self.lift("__ret", call.returns.success())));
        }
    }

    /// Managed → flat. `source` is the managed expression, `local` a free
    /// identifier for any temporaries.
    fn lower_arg(&self, source: &str, local: &str, ty: &TypeRef) -> Lowered {
        match ty {
            TypeRef::Primitive(PrimitiveKind::Bool) => {
                Lowered::plain(format!("{source} ? (byte)1 : (byte)0"))
            }
            TypeRef::Str => Lowered {
                setup: vec![format!("using var {local} = {};", self.temporary(source, ty))],
                arg: format!("{local}.View"),
                keep_alive: None,
            },
            TypeRef::Handle(id) if self.schema.is_enum(*id) => Lowered {
                setup: vec![format!("using var {local} = {};", self.temporary(source, ty))],
                arg: format!("{local}.Value"),
                keep_alive: None,
            },
            TypeRef::Handle(_) => Lowered {
                setup: Vec::new(),
                arg: format!("{source}.RawHandle"),
                keep_alive: Some(source.to_string()),
            },
            TypeRef::Option(inner) => {
                let option = AbiType::of(ty, Direction::In).csharp_type();
                match inner.as_ref() {
                    TypeRef::Primitive(kind) => {
                        let value = match kind {
                            PrimitiveKind::Bool => format!("{local} ? (byte)1 : (byte)0"),
                            _ => local.to_string(),
                        };
                        Lowered::plain(format!(
                            "{source} is {{ }} {local} ? new {option} {{ Present = 1, Value = {value} }} : default"
                        ))
                    }
                    TypeRef::Handle(id) if !self.schema.is_enum(*id) => Lowered {
                        setup: Vec::new(),
                        arg: format!(
                            "{source} is null ? default : new {option} {{ Present = 1, Value = {source}.RawHandle }}"
                        ),
                        keep_alive: Some(source.to_string()),
                    },
                    other => {
                        let view = if matches!(other, TypeRef::Str) { "View" } else { "Value" };
                        Lowered {
                            setup: vec![format!(
                                "using var {local} = {source} is null ? null : {};",
                                self.temporary(source, other)
                            )],
                            arg: format!(
                                "{local} is null ? default : new {option} {{ Present = 1, Value = {local}.{view} }}"
                            ),
                            keep_alive: None,
                        }
                    }
                }
            }
            _ => Lowered::plain(source.to_string()),
        }
    }

    /// Disposable holding the flat form of a string or enum argument.
    fn temporary(&self, source: &str, ty: &TypeRef) -> String {
        match ty {
            TypeRef::Handle(id) => {
                let name = self.schema.type_name(*id);
                let class = self.qualified(&naming::to_pascal_case(name));
                format!("new OwnedHandle({class}.Lower({source}), {class}.Free, \"{name}\")")
            }
            _ => format!("new Utf8Arg({source})"),
        }
    }

    /// Flat → managed, for a value already checked by `Ffi.Check`.
    fn lift(&self, expr: &str, ty: &TypeRef) -> String {
        match ty {
            TypeRef::Primitive(PrimitiveKind::Bool) => format!("{expr} != 0"),
            TypeRef::Str => format!("Ffi.LiftString({expr})"),
            TypeRef::Handle(id) => {
                let class = self.qualified(&naming::to_pascal_case(self.schema.type_name(*id)));
                if self.schema.is_enum(*id) {
                    format!("{class}.Decode({expr})")
                } else {
                    format!("{class}.FromHandle({expr})")
                }
            }
            TypeRef::Option(inner) => format!(
                "{expr}.Present != 0 ? ({})({}) : null",
                self.managed_type(ty),
                self.lift(&format!("{expr}.Value"), inner)
            ),
            _ => expr.to_string(),
        }
    }

    /// Expression reading a wire-encoded value of `ty` from `reader`.
    fn read(&self, ty: &TypeRef, reader: &str) -> String {
        match ty {
            TypeRef::Primitive(PrimitiveKind::Bool) => format!("{reader}.ReadBool()"),
            TypeRef::Primitive(kind) => {
                format!("{reader}.Read{}()", naming::to_pascal_case(kind.rust_name()))
            }
            TypeRef::Str => format!("{reader}.ReadString()"),
            TypeRef::Handle(id) => {
                let class = self.qualified(&naming::to_pascal_case(self.schema.type_name(*id)));
                if self.schema.is_enum(*id) {
                    format!("{class}.Decode({reader}.ReadHandle())")
                } else {
                    format!("{class}.FromHandle({reader}.ReadHandle())")
                }
            }
            TypeRef::Option(inner) => format!(
                "{reader}.ReadPresence() ? ({})({}) : null",
                self.managed_type(ty),
                self.read(inner, reader)
            ),
            _ => "default".to_string(),
        }
    }

    fn managed_type(&self, ty: &TypeRef) -> String {
        match ty {
            TypeRef::Unit => "void".to_string(),
            TypeRef::Primitive(kind) => abi::csharp_scalar(*kind).to_string(),
            TypeRef::Str => "string".to_string(),
            TypeRef::Handle(id) => {
                let name = naming::to_pascal_case(self.schema.type_name(*id));
                if self.schema.is_enum(*id) {
                    self.qualified(&format!("I{name}"))
                } else {
                    self.qualified(&name)
                }
            }
            TypeRef::Option(inner) => format!("{}?", self.managed_type(inner)),
            TypeRef::Result(ok, _) => self.managed_type(ok),
            TypeRef::Unsupported(_) => "object".to_string(),
        }
    }

    fn qualified(&self, name: &str) -> String {
        format!("global::{}.{name}", self.namespace)
    }
}

// ————————————————————————————————————————————————————————————————————————————
// INTERNAL HELPERS
// ————————————————————————————————————————————————————————————————————————————

fn managed_param(name: &str) -> String {
    naming::csharp_ident(&naming::to_camel_case(name))
}

fn native_param(name: &str) -> String {
    naming::csharp_ident(naming::bare(name))
}

/// Temporary for a parameter. The `__arg` prefix keeps it clear of the
/// fixed locals (`__status`, `__ret`, ...).
fn local(name: &str) -> String {
    format!("__arg{}", naming::to_pascal_case(name))
}

fn record_field(name: FieldName<'_>) -> String {
    match name {
        FieldName::Index(i) => format!("Item{i}"),
        FieldName::Named(name) => naming::to_pascal_case(name),
    }
}
