//! # Allocation Ledger
//!
//! Every heap allocation the generator emits at top level — string
//! concatenation buffers, dynamic array literals, struct constructor
//! payloads, `sprintf` output buffers, `zeros` backing arrays — is
//! registered here for bulk release just before `main` returns
//! (`spec.md` §5).
//!
//! `spec.md` describes a fixed 100-slot tracking array. This generator
//! instead grows the ledger's backing buffer with `realloc`, doubling
//! from an initial capacity of 16 (redesign option (i) listed in
//! `spec.md` §9's open questions: the ledger's capacity was flagged as an
//! arbitrary cap with a silent-overflow failure mode; growing it removes
//! that failure mode outright while keeping the same "release everything
//! at program exit" policy and the same "never double-free" invariant).
//! Allocations made inside ordinary function bodies are still outside the
//! ledger's reach and are intentionally leaked, exactly as `spec.md`
//! documents.

use inkwell::context::Context;
use inkwell::module::Module;
use inkwell::values::{GlobalValue, PointerValue};
use inkwell::AddressSpace;

use super::runtime::RuntimeDecls;
use super::CodegenContext;

const INITIAL_CAPACITY: u64 = 16;

pub struct AllocLedger<'ctx> {
    buf: GlobalValue<'ctx>,
    count: GlobalValue<'ctx>,
    cap: GlobalValue<'ctx>,
}

impl<'ctx> AllocLedger<'ctx> {
    pub fn declare(context: &'ctx Context, module: &Module<'ctx>) -> Self {
        let ptr_ty = context.ptr_type(AddressSpace::default());
        let i64_ty = context.i64_type();

        let buf = module.add_global(ptr_ty, None, "__noxy_ledger_buf");
        buf.set_initializer(&ptr_ty.const_null());

        let count = module.add_global(i64_ty, None, "__noxy_ledger_count");
        count.set_initializer(&i64_ty.const_zero());

        let cap = module.add_global(i64_ty, None, "__noxy_ledger_cap");
        cap.set_initializer(&i64_ty.const_zero());

        Self { buf, count, cap }
    }

    /// Appends `ptr` to the ledger, growing the backing buffer first if
    /// it is already at capacity.
    pub fn push(&self, ctx: &CodegenContext<'ctx>, ptr: PointerValue<'ctx>) {
        let builder = &ctx.builder;
        let context = ctx.context;
        let i64_ty = context.i64_type();
        let ptr_ty = context.ptr_type(AddressSpace::default());

        let current_fn = builder
            .get_insert_block()
            .and_then(|b| b.get_parent())
            .expect("ledger push must run inside a function");

        let grow_block = context.append_basic_block(current_fn, "ledger.grow");
        let merge_block = context.append_basic_block(current_fn, "ledger.append");

        let count_val = builder
            .build_load(i64_ty, self.count.as_pointer_value(), "ledger.count")
            .unwrap()
            .into_int_value();
        let cap_val = builder
            .build_load(i64_ty, self.cap.as_pointer_value(), "ledger.cap")
            .unwrap()
            .into_int_value();

        let needs_growth = builder
            .build_int_compare(inkwell::IntPredicate::EQ, count_val, cap_val, "ledger.full")
            .unwrap();
        builder
            .build_conditional_branch(needs_growth, grow_block, merge_block)
            .unwrap();

        builder.position_at_end(grow_block);
        let is_empty = builder
            .build_int_compare(
                inkwell::IntPredicate::EQ,
                cap_val,
                i64_ty.const_zero(),
                "ledger.empty",
            )
            .unwrap();
        let doubled = builder.build_int_mul(cap_val, i64_ty.const_int(2, false), "ledger.doubled").unwrap();
        let new_cap = builder
            .build_select(is_empty, i64_ty.const_int(INITIAL_CAPACITY, false), doubled, "ledger.newcap")
            .unwrap()
            .into_int_value();
        let slot_size = i64_ty.const_int(8, false); // sizeof(ptr) on the supported 64-bit targets
        let new_bytes = builder.build_int_mul(new_cap, slot_size, "ledger.newbytes").unwrap();
        let old_buf = builder
            .build_load(ptr_ty, self.buf.as_pointer_value(), "ledger.oldbuf")
            .unwrap()
            .into_pointer_value();
        let grown = builder
            .build_call(ctx.runtime.realloc, &[old_buf.into(), new_bytes.into()], "ledger.grown")
            .unwrap()
            .try_as_basic_value()
            .left()
            .unwrap()
            .into_pointer_value();
        builder.build_store(self.buf.as_pointer_value(), grown).unwrap();
        builder.build_store(self.cap.as_pointer_value(), new_cap).unwrap();
        builder.build_unconditional_branch(merge_block).unwrap();

        builder.position_at_end(merge_block);
        let buf_val = builder
            .build_load(ptr_ty, self.buf.as_pointer_value(), "ledger.buf")
            .unwrap()
            .into_pointer_value();
        let count_val = builder
            .build_load(i64_ty, self.count.as_pointer_value(), "ledger.count2")
            .unwrap()
            .into_int_value();
        let slot = unsafe {
            builder
                .build_in_bounds_gep(ptr_ty, buf_val, &[count_val], "ledger.slot")
                .unwrap()
        };
        builder.build_store(slot, ptr).unwrap();
        let next_count = builder.build_int_add(count_val, i64_ty.const_int(1, false), "ledger.next").unwrap();
        builder.build_store(self.count.as_pointer_value(), next_count).unwrap();
    }

    /// Emits the `free` loop run just before `main` returns, then frees
    /// the ledger's own backing buffer.
    pub fn emit_cleanup(&self, ctx: &CodegenContext<'ctx>, runtime: &RuntimeDecls<'ctx>) {
        let builder = &ctx.builder;
        let context = ctx.context;
        let i64_ty = context.i64_type();
        let ptr_ty = context.ptr_type(AddressSpace::default());

        let current_fn = builder
            .get_insert_block()
            .and_then(|b| b.get_parent())
            .expect("ledger cleanup must run inside a function");

        let i = builder.build_alloca(i64_ty, "ledger.i").unwrap();
        builder.build_store(i, i64_ty.const_zero()).unwrap();

        let cond_block = context.append_basic_block(current_fn, "ledger.cleanup.cond");
        let body_block = context.append_basic_block(current_fn, "ledger.cleanup.body");
        let end_block = context.append_basic_block(current_fn, "ledger.cleanup.end");

        builder.build_unconditional_branch(cond_block).unwrap();

        builder.position_at_end(cond_block);
        let i_val = builder.build_load(i64_ty, i, "ledger.i.val").unwrap().into_int_value();
        let count_val = builder
            .build_load(i64_ty, self.count.as_pointer_value(), "ledger.count")
            .unwrap()
            .into_int_value();
        let keep_going = builder
            .build_int_compare(inkwell::IntPredicate::SLT, i_val, count_val, "ledger.cond")
            .unwrap();
        builder
            .build_conditional_branch(keep_going, body_block, end_block)
            .unwrap();

        builder.position_at_end(body_block);
        let buf_val = builder
            .build_load(ptr_ty, self.buf.as_pointer_value(), "ledger.buf")
            .unwrap()
            .into_pointer_value();
        let slot = unsafe {
            builder
                .build_in_bounds_gep(ptr_ty, buf_val, &[i_val], "ledger.slot")
                .unwrap()
        };
        let entry = builder.build_load(ptr_ty, slot, "ledger.entry").unwrap().into_pointer_value();
        builder.build_call(runtime.free, &[entry.into()], "").unwrap();
        let next_i = builder.build_int_add(i_val, i64_ty.const_int(1, false), "ledger.i.next").unwrap();
        builder.build_store(i, next_i).unwrap();
        builder.build_unconditional_branch(cond_block).unwrap();

        builder.position_at_end(end_block);
        let buf_val = builder
            .build_load(ptr_ty, self.buf.as_pointer_value(), "ledger.buf.final")
            .unwrap()
            .into_pointer_value();
        builder.build_call(runtime.free, &[buf_val.into()], "").unwrap();
    }
}
